//! Structural representation of a single SELECT statement.
//!
//! Every node is a closed type; the JSON shape is the one the question builder
//! stores (`{"type": "aggregate", "aggregate": "COUNT", "column": null, ...}`).

use serde::{Deserialize, Serialize};

pub const IR_VERSION: u32 = 1;

fn default_version() -> u32 {
    IR_VERSION
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryIR {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub distinct: bool,
    #[serde(default)]
    pub select: Vec<SelectItem>,
    /// Required; kept optional so a malformed document can still be represented and rejected by the generator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<TableRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub joins: Vec<Join>,
    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterGroup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<GroupBy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub having: Option<FilterGroup>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order_by: Vec<OrderByItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SelectItem {
    Column(SelectColumn),
    Aggregate(SelectAggregate),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectColumn {
    pub column: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

/// `column: None` is `COUNT(*)` and nothing else. Always serialized, as `null` when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectAggregate {
    pub aggregate: AggregateFunction,
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AggregateFunction {
    Count,
    CountDistinct,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunction {
    /// SQL function name; `COUNT_DISTINCT` renders as `COUNT(DISTINCT ...)`.
    pub fn sql_name(&self) -> &'static str {
        match self {
            AggregateFunction::Count | AggregateFunction::CountDistinct => "COUNT",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Avg => "AVG",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
        }
    }

    pub fn from_sql_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "COUNT" => Some(AggregateFunction::Count),
            "SUM" => Some(AggregateFunction::Sum),
            "AVG" => Some(AggregateFunction::Avg),
            "MIN" => Some(AggregateFunction::Min),
            "MAX" => Some(AggregateFunction::Max),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
}

impl TableRef {
    pub fn new(table: impl Into<String>) -> Self {
        Self { table: table.into(), alias: None, schema: None }
    }

    /// Name the rest of the query uses for this table (alias if present).
    pub fn reference_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JoinType {
    Inner,
    Left,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Join {
    #[serde(rename = "type")]
    pub kind: JoinType,
    pub table: TableRef,
    #[serde(default)]
    pub on: Vec<JoinCondition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinCondition {
    pub left_table: String,
    pub left_column: String,
    pub right_table: String,
    pub right_column: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOperator {
    And,
    Or,
}

impl LogicalOperator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            LogicalOperator::And => "AND",
            LogicalOperator::Or => "OR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterGroup {
    pub operator: LogicalOperator,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonOperator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    NotEq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    GtEq,
    #[serde(rename = "<=")]
    LtEq,
    #[serde(rename = "LIKE")]
    Like,
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "IS NULL")]
    IsNull,
    #[serde(rename = "IS NOT NULL")]
    IsNotNull,
}

impl ComparisonOperator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ComparisonOperator::Eq => "=",
            ComparisonOperator::NotEq => "!=",
            ComparisonOperator::Gt => ">",
            ComparisonOperator::Lt => "<",
            ComparisonOperator::GtEq => ">=",
            ComparisonOperator::LtEq => "<=",
            ComparisonOperator::Like => "LIKE",
            ComparisonOperator::In => "IN",
            ComparisonOperator::IsNull => "IS NULL",
            ComparisonOperator::IsNotNull => "IS NOT NULL",
        }
    }

    pub fn needs_operand(&self) -> bool {
        !matches!(self, ComparisonOperator::IsNull | ComparisonOperator::IsNotNull)
    }

    /// Operator to use when the operands of a binary comparison are swapped.
    pub fn mirrored(&self) -> Self {
        match self {
            ComparisonOperator::Gt => ComparisonOperator::Lt,
            ComparisonOperator::Lt => ComparisonOperator::Gt,
            ComparisonOperator::GtEq => ComparisonOperator::LtEq,
            ComparisonOperator::LtEq => ComparisonOperator::GtEq,
            other => *other,
        }
    }
}

/// Literal operand. Numbers stay numbers, strings stay strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    List(Vec<Literal>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Value(Literal),
    Param(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ConditionWire", into = "ConditionWire")]
pub struct Condition {
    pub column: String,
    pub table: Option<String>,
    /// Set only in HAVING, for comparisons against an aggregate (`COUNT(*)` uses column `*`).
    pub aggregate: Option<AggregateFunction>,
    pub operator: ComparisonOperator,
    pub operand: Option<Operand>,
}

impl Condition {
    pub fn new(column: impl Into<String>, operator: ComparisonOperator, operand: Option<Operand>) -> Self {
        Self { column: column.into(), table: None, aggregate: None, operator, operand }
    }

    pub fn param_name(&self) -> Option<&str> {
        match &self.operand {
            Some(Operand::Param(p)) => Some(p),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct ConditionWire {
    column: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    aggregate: Option<AggregateFunction>,
    operator: ComparisonOperator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<Literal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    param_name: Option<String>,
}

impl TryFrom<ConditionWire> for Condition {
    type Error = String;

    fn try_from(w: ConditionWire) -> Result<Self, Self::Error> {
        let operand = match (w.value, w.param_name) {
            (Some(_), Some(_)) => {
                return Err(format!("condition on '{}' has both value and param_name", w.column));
            }
            (Some(v), None) => Some(Operand::Value(v)),
            (None, Some(p)) => Some(Operand::Param(p)),
            (None, None) => None,
        };
        Ok(Condition {
            column: w.column,
            table: w.table,
            aggregate: w.aggregate,
            operator: w.operator,
            operand,
        })
    }
}

impl From<Condition> for ConditionWire {
    fn from(c: Condition) -> Self {
        let (value, param_name) = match c.operand {
            Some(Operand::Value(v)) => (Some(v), None),
            Some(Operand::Param(p)) => (None, Some(p)),
            None => (None, None),
        };
        ConditionWire {
            column: c.column,
            table: c.table,
            aggregate: c.aggregate,
            operator: c.operator,
            value,
            param_name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRef {
    pub column: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupBy {
    #[serde(default)]
    pub columns: Vec<ColumnRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderByItem {
    pub column: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default)]
    pub direction: SortDirection,
}

impl QueryIR {
    pub fn new(from: TableRef) -> Self {
        Self {
            version: IR_VERSION,
            distinct: false,
            select: Vec::new(),
            from: Some(from),
            joins: Vec::new(),
            filter: None,
            group_by: None,
            having: None,
            order_by: Vec::new(),
            limit: None,
        }
    }

    /// Key-sorted JSON. Two documents with the same logical content produce the same string.
    pub fn stable_json(&self) -> String {
        // serde_json::Value keeps object keys in a BTreeMap, so re-serializing sorts them.
        match serde_json::to_value(self) {
            Ok(v) => v.to_string(),
            Err(e) => {
                log::warn!("QueryIR serialization failed: {}", e);
                String::new()
            }
        }
    }

    /// Distinct `:name` parameters in first-use order (WHERE, then HAVING).
    pub fn parameters(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for group in [&self.filter, &self.having].into_iter().flatten() {
            for cond in &group.conditions {
                if let Some(p) = cond.param_name()
                    && !out.iter().any(|seen| seen == p)
                {
                    out.push(p.to_string());
                }
            }
        }
        out
    }
}

/// Structural equality under the stable serialization.
pub fn ir_equals(a: &QueryIR, b: &QueryIR) -> bool {
    a.stable_json() == b.stable_json()
}

/// True when the edited IR no longer matches the saved one.
pub fn is_dirty(saved: Option<&QueryIR>, current: &QueryIR) -> bool {
    saved.is_none_or(|s| !ir_equals(s, current))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> QueryIR {
        let mut ir = QueryIR::new(TableRef::new("orders"));
        ir.select.push(SelectItem::Column(SelectColumn { column: "id".into(), table: None, alias: None }));
        ir.select.push(SelectItem::Aggregate(SelectAggregate {
            aggregate: AggregateFunction::Count,
            column: None,
            table: None,
            alias: Some("total".into()),
        }));
        ir
    }

    #[test]
    fn count_star_serializes_null_column() {
        let v = serde_json::to_value(sample()).unwrap();
        assert_eq!(v["select"][1]["type"], "aggregate");
        assert_eq!(v["select"][1]["aggregate"], "COUNT");
        assert!(v["select"][1]["column"].is_null());
        assert!(v["select"][1].as_object().unwrap().contains_key("column"));
    }

    #[test]
    fn condition_wire_shape() {
        let cond: Condition = serde_json::from_value(json!({
            "column": "status", "operator": "IN", "value": ["a", "b"]
        }))
        .unwrap();
        assert_eq!(cond.operator, ComparisonOperator::In);
        assert_eq!(
            cond.operand,
            Some(Operand::Value(Literal::List(vec![
                Literal::String("a".into()),
                Literal::String("b".into())
            ])))
        );

        let param: Condition = serde_json::from_value(json!({
            "column": "created_at", "operator": ">=", "param_name": "start_date"
        }))
        .unwrap();
        assert_eq!(param.param_name(), Some("start_date"));

        let both = serde_json::from_value::<Condition>(json!({
            "column": "x", "operator": "=", "value": 1, "param_name": "p"
        }));
        assert!(both.is_err());
    }

    #[test]
    fn numbers_stay_numeric() {
        let cond: Condition =
            serde_json::from_value(json!({"column": "amount", "operator": ">", "value": 100})).unwrap();
        let back = serde_json::to_value(&cond).unwrap();
        assert!(back["value"].is_number());
        assert_eq!(back["value"], json!(100));
    }

    #[test]
    fn deep_clone_is_clean_and_edit_is_dirty() {
        let saved = sample();
        let copy: QueryIR = serde_json::from_str(&serde_json::to_string(&saved).unwrap()).unwrap();
        assert!(ir_equals(&saved, &copy));
        assert!(!is_dirty(Some(&saved), &copy));

        let mut edited = copy.clone();
        edited.select.push(SelectItem::Column(SelectColumn { column: "name".into(), table: None, alias: None }));
        assert!(is_dirty(Some(&saved), &edited));
        assert!(is_dirty(None, &edited));
    }

    #[test]
    fn stable_json_ignores_key_order() {
        let a: QueryIR = serde_json::from_str(
            r#"{"from":{"table":"t","alias":"x"},"select":[{"type":"column","column":"a"}],"version":1,"distinct":false}"#,
        )
        .unwrap();
        let b: QueryIR = serde_json::from_str(
            r#"{"version":1,"distinct":false,"select":[{"column":"a","type":"column"}],"from":{"alias":"x","table":"t"}}"#,
        )
        .unwrap();
        assert_eq!(a.stable_json(), b.stable_json());
    }

    #[test]
    fn parameters_in_first_use_order() {
        let mut ir = sample();
        ir.filter = Some(FilterGroup {
            operator: LogicalOperator::And,
            conditions: vec![
                Condition::new("a", ComparisonOperator::Eq, Some(Operand::Param("p2".into()))),
                Condition::new("b", ComparisonOperator::Eq, Some(Operand::Param("p1".into()))),
                Condition::new("c", ComparisonOperator::Eq, Some(Operand::Param("p2".into()))),
            ],
        });
        assert_eq!(ir.parameters(), vec!["p2".to_string(), "p1".to_string()]);
    }
}
