use crate::error::{RetrievalError, Result};
use crate::schema::IndexField;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
}

impl FilterOp {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub field: IndexField,
    pub op: FilterOp,
    pub value: String,
}

impl Clause {
    fn matches(&self, actual: Option<&str>) -> bool {
        match self.op {
            FilterOp::Eq => actual == Some(self.value.as_str()),
            FilterOp::Ne => actual != Some(self.value.as_str()),
        }
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} '{}'",
            self.field,
            self.op.as_str(),
            self.value.replace('\'', "''")
        )
    }
}

/// A conjunction of comparison clauses that always begins with the tenant
/// clause. The only constructor is [`Filter::for_tenant`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    clauses: Vec<Clause>,
}

impl Filter {
    pub fn for_tenant(client_id: &str) -> Result<Self> {
        if client_id.trim().is_empty() {
            return Err(RetrievalError::validation("client_id is required for every query"));
        }

        Ok(Self {
            clauses: vec![Clause {
                field: IndexField::ClientId,
                op: FilterOp::Eq,
                value: client_id.to_string(),
            }],
        })
    }

    pub fn and_eq(self, field: IndexField, value: impl Into<String>) -> Self {
        self.and(field, FilterOp::Eq, value)
    }

    pub fn and_ne(self, field: IndexField, value: impl Into<String>) -> Self {
        self.and(field, FilterOp::Ne, value)
    }

    fn and(mut self, field: IndexField, op: FilterOp, value: impl Into<String>) -> Self {
        self.clauses.push(Clause {
            field,
            op,
            value: value.into(),
        });
        self
    }

    pub fn tenant(&self) -> &str {
        &self.clauses[0].value
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Evaluates the filter against a record whose field values are resolved by `lookup`.
    pub fn matches<F>(&self, lookup: F) -> bool
    where
        F: Fn(IndexField) -> Option<String>,
    {
        self.clauses
            .iter()
            .all(|clause| clause.matches(lookup(clause.field).as_deref()))
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (position, clause) in self.clauses.iter().enumerate() {
            if position > 0 {
                f.write_str(" and ")?;
            }
            write!(f, "{clause}")?;
        }
        Ok(())
    }
}

/// Tenant clause, then document, then section type.
pub fn build_filter(
    client_id: &str,
    document_id: Option<&str>,
    section_type: Option<&str>,
) -> Result<Filter> {
    let mut filter = Filter::for_tenant(client_id)?;

    if let Some(document_id) = document_id.filter(|value| !value.is_empty()) {
        filter = filter.and_eq(IndexField::DocumentId, document_id);
    }
    if let Some(section_type) = section_type.filter(|value| !value.is_empty()) {
        filter = filter.and_eq(IndexField::SectionType, section_type);
    }

    Ok(filter)
}
