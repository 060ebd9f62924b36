use mantle_document::Document;

use crate::expression::Expression;
use crate::projection::Projection;
use crate::sort::{Sort, sort_documents};

/// A parsed read: filter, then sort, skip, limit, and finally projection.
#[derive(Debug, Clone)]
pub struct Query {
    pub filter: Expression,
    pub sort: Vec<Sort>,
    pub skip: usize,
    pub limit: Option<usize>,
    pub projection: Projection,
}

impl Default for Query {
    fn default() -> Self {
        Self::new(Expression::everything())
    }
}

impl Query {
    pub fn new(filter: Expression) -> Self {
        Self {
            filter,
            sort: Vec::new(),
            skip: 0,
            limit: None,
            projection: Projection::identity(),
        }
    }

    pub fn execute(&self, docs: impl IntoIterator<Item = Document>) -> Vec<Document> {
        let limit = self.limit.unwrap_or(usize::MAX);
        let matched = docs.into_iter().filter(|d| self.filter.matches(d));

        let window: Vec<Document> = if self.sort.is_empty() {
            matched.skip(self.skip).take(limit).collect()
        } else {
            let mut all: Vec<Document> = matched.collect();
            sort_documents(&mut all, &self.sort);
            all.into_iter().skip(self.skip).take(limit).collect()
        };

        if self.projection.is_identity() {
            window
        } else {
            window.iter().map(|d| self.projection.apply(d)).collect()
        }
    }

    /// Number of matching documents after skip and limit.
    pub fn count<'a>(&self, docs: impl IntoIterator<Item = &'a Document>) -> usize {
        let matched = docs.into_iter().filter(|d| self.filter.matches(d)).count();
        matched
            .saturating_sub(self.skip)
            .min(self.limit.unwrap_or(usize::MAX))
    }
}
