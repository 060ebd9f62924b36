use mantle_document::Value;
use regex::Regex;

/// A parsed filter: a tree of field conditions joined by logical nodes.
///
/// Built once per query and evaluated against every candidate document.
#[derive(Debug, Clone)]
pub enum Expression {
    And(Vec<Expression>),
    Or(Vec<Expression>),
    Nor(Vec<Expression>),
    Field(String, Condition),
}

/// A predicate over the value(s) found at one field path.
#[derive(Debug, Clone)]
pub enum Condition {
    /// `{field: literal}`: type-strict deep equality.
    Equals(Value),
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Member>),
    Nin(Vec<Member>),
    Regex(Regex),
    Exists(bool),
    Not(Box<Condition>),
    /// Several operators on the same field, all of which must hold.
    All(Vec<Condition>),
}

/// One element of an `$in`/`$nin` list.
#[derive(Debug, Clone)]
pub enum Member {
    Value(Value),
    Pattern(Regex),
}

impl Expression {
    /// The filter that matches every document.
    pub fn everything() -> Self {
        Expression::And(Vec::new())
    }
}
