use std::fmt;

/// Constructs the builder refuses to represent. `label()` is the string surfaced to users.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UnsupportedFeature {
    MultipleStatements,
    NotASelect,
    Subquery,
    Cte,
    SetOperation,
    Case,
    WindowFunction,
    Between,
    NotLike,
    NotIn,
    Regex,
    ILike,
    LikeEscape,
    ComplexAggregate,
    ComplexFilter,
    ComplexProjection,
    ScalarFunction(String),
    UnsupportedAggregate(String),
    DistinctAggregate,
    AggregateFilter,
    AggregateInWhere,
    NestedLogic,
    NotExpression,
    NullComparison,
    ColumnComparison,
    DistinctOn,
    Top,
    Offset,
    Fetch,
    NonLiteralLimit,
    MissingFrom,
    MultipleFrom,
    TableFunction,
    QualifiedTableName,
    JoinKind(String),
    JoinUsing,
    NonEqualityJoin,
    UnqualifiedJoinColumn,
    GroupByAll,
    GroupByModifiers,
    GroupByExpression,
    OrderByExpression,
    OrderByNulls,
    UnsupportedLiteral(String),
    NumberOutOfRange(String),
    InexactNumber(String),
    SelectInto,
    Qualify,
    Locking,
}

impl UnsupportedFeature {
    pub fn label(&self) -> String {
        match self {
            UnsupportedFeature::MultipleStatements => "multiple statements".into(),
            UnsupportedFeature::NotASelect => "non-SELECT statements".into(),
            UnsupportedFeature::Subquery => "subqueries".into(),
            UnsupportedFeature::Cte => "CTEs (WITH clause)".into(),
            UnsupportedFeature::SetOperation => "UNION/INTERSECT/EXCEPT".into(),
            UnsupportedFeature::Case => "CASE expressions".into(),
            UnsupportedFeature::WindowFunction => "window functions".into(),
            UnsupportedFeature::Between => "BETWEEN (use >= and <= instead)".into(),
            UnsupportedFeature::NotLike => "NOT LIKE".into(),
            UnsupportedFeature::NotIn => "NOT IN".into(),
            UnsupportedFeature::Regex => "regex operators".into(),
            UnsupportedFeature::ILike => "ILIKE".into(),
            UnsupportedFeature::LikeEscape => "LIKE ... ESCAPE".into(),
            UnsupportedFeature::ComplexAggregate => "complex aggregate expressions".into(),
            UnsupportedFeature::ComplexFilter => "complex filter expressions".into(),
            UnsupportedFeature::ComplexProjection => "computed SELECT expressions".into(),
            UnsupportedFeature::ScalarFunction(name) => format!("function {}()", name),
            UnsupportedFeature::UnsupportedAggregate(name) => format!("aggregate {}()", name),
            UnsupportedFeature::DistinctAggregate => "DISTINCT inside aggregates other than COUNT".into(),
            UnsupportedFeature::AggregateFilter => "aggregate FILTER/WITHIN GROUP clauses".into(),
            UnsupportedFeature::AggregateInWhere => "aggregates in WHERE (use HAVING)".into(),
            UnsupportedFeature::NestedLogic => "nested AND/OR conditions".into(),
            UnsupportedFeature::NotExpression => "NOT expressions".into(),
            UnsupportedFeature::NullComparison => "comparison with NULL (use IS NULL / IS NOT NULL)".into(),
            UnsupportedFeature::ColumnComparison => "column-to-column comparisons".into(),
            UnsupportedFeature::DistinctOn => "DISTINCT ON".into(),
            UnsupportedFeature::Top => "TOP (use LIMIT)".into(),
            UnsupportedFeature::Offset => "OFFSET".into(),
            UnsupportedFeature::Fetch => "FETCH FIRST".into(),
            UnsupportedFeature::NonLiteralLimit => "non-literal LIMIT".into(),
            UnsupportedFeature::MissingFrom => "SELECT without FROM".into(),
            UnsupportedFeature::MultipleFrom => "multiple FROM tables (use JOIN)".into(),
            UnsupportedFeature::TableFunction => "table functions".into(),
            UnsupportedFeature::QualifiedTableName => "catalog-qualified table names".into(),
            UnsupportedFeature::JoinKind(kind) => format!("{} JOIN", kind),
            UnsupportedFeature::JoinUsing => "JOIN USING / NATURAL JOIN".into(),
            UnsupportedFeature::NonEqualityJoin => "non-equality JOIN conditions".into(),
            UnsupportedFeature::UnqualifiedJoinColumn => "unqualified columns in JOIN conditions".into(),
            UnsupportedFeature::GroupByAll => "GROUP BY ALL".into(),
            UnsupportedFeature::GroupByModifiers => "GROUP BY modifiers (ROLLUP/CUBE/TOTALS)".into(),
            UnsupportedFeature::GroupByExpression => "expressions in GROUP BY".into(),
            UnsupportedFeature::OrderByExpression => "expressions in ORDER BY".into(),
            UnsupportedFeature::OrderByNulls => "NULLS FIRST/LAST".into(),
            UnsupportedFeature::UnsupportedLiteral(kind) => format!("{} literals", kind),
            UnsupportedFeature::NumberOutOfRange(n) => format!("numeric literal {} out of range", n),
            UnsupportedFeature::InexactNumber(n) => format!("numeric literal {} (more precision than a double holds)", n),
            UnsupportedFeature::SelectInto => "SELECT INTO".into(),
            UnsupportedFeature::Qualify => "QUALIFY".into(),
            UnsupportedFeature::Locking => "locking clauses (FOR UPDATE)".into(),
        }
    }

    pub fn hint(&self) -> Option<&'static str> {
        match self {
            UnsupportedFeature::Between => Some("Replace BETWEEN with two conditions: column >= low AND column <= high."),
            UnsupportedFeature::NotLike | UnsupportedFeature::NotIn | UnsupportedFeature::NotExpression => {
                Some("Negated conditions are not available in the visual builder; rewrite them positively or use SQL mode.")
            }
            UnsupportedFeature::ComplexAggregate => {
                Some("Aggregates must wrap a single column; compute the expression in a saved question and reference it with @.")
            }
            UnsupportedFeature::ComplexFilter => Some("Filters must compare a single column with a value or :parameter."),
            UnsupportedFeature::AggregateInWhere => Some("Move aggregate conditions into HAVING."),
            UnsupportedFeature::NullComparison => Some("Use IS NULL or IS NOT NULL."),
            UnsupportedFeature::Cte | UnsupportedFeature::Subquery => {
                Some("Save the inner query as its own question and reference it with @name_id.")
            }
            UnsupportedFeature::InexactNumber(_) => {
                Some("Round the literal to at most 15 significant digits or bind it through a :parameter.")
            }
            UnsupportedFeature::Top => Some("Use LIMIT instead of TOP."),
            UnsupportedFeature::MultipleFrom => Some("Rewrite comma joins as explicit INNER JOIN ... ON."),
            _ => None,
        }
    }
}

impl fmt::Display for UnsupportedFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

pub const DEFAULT_UNSUPPORTED_HINT: &str =
    "This query uses SQL the visual builder cannot represent. Switch to SQL mode to edit it.";

#[derive(thiserror::Error, Debug)]
pub enum QueryIrError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("unsupported SQL features: {}", join_labels(.0))]
    Unsupported(Vec<UnsupportedFeature>),
    #[error("emit error: {0}")]
    Emit(String),
}

fn join_labels(features: &[UnsupportedFeature]) -> String {
    features.iter().map(|f| f.label()).collect::<Vec<_>>().join(", ")
}

impl QueryIrError {
    pub fn unsupported_features(&self) -> Vec<String> {
        match self {
            QueryIrError::Unsupported(features) => features.iter().map(|f| f.label()).collect(),
            _ => Vec::new(),
        }
    }

    /// First specific hint among the reported features, else the generic builder hint.
    pub fn hint(&self) -> Option<String> {
        match self {
            QueryIrError::Unsupported(features) => Some(
                features
                    .iter()
                    .find_map(|f| f.hint())
                    .unwrap_or(DEFAULT_UNSUPPORTED_HINT)
                    .to_string(),
            ),
            QueryIrError::Parse(_) => Some("Check the SQL syntax.".to_string()),
            QueryIrError::Emit(_) => None,
        }
    }

    /// Short summary suitable for the `error` field of a response.
    pub fn summary(&self) -> String {
        match self {
            QueryIrError::Unsupported(_) => "Query uses features not supported by the visual builder".to_string(),
            other => other.to_string(),
        }
    }
}
