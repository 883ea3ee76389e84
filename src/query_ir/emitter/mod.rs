use sqlformat::{FormatOptions, Indent, QueryParams};

use super::errors::QueryIrError;
use super::ir::{
    AggregateFunction, ComparisonOperator, Condition, FilterGroup, Join, JoinType, Literal, Operand, OrderByItem, QueryIR,
    SelectItem, SortDirection, TableRef,
};
use crate::models::enums::DatabaseType;

pub mod dialect;
use dialect::{SqlDialect, get_dialect};

#[derive(Debug, Clone, Copy, Default)]
pub struct GenerateOptions {
    pub pretty: bool,
    pub database_type: DatabaseType,
}

/// Render `ir` as canonical single-line SQL (or formatted SQL when `pretty`).
///
/// Only structural problems are errors: a missing `from`, an empty projection, or
/// a condition whose operator needs an operand but has none.
pub fn emit_sql(ir: &QueryIR, options: &GenerateOptions) -> Result<String, QueryIrError> {
    let dialect = get_dialect(options.database_type);
    let emitter = IrEmitter { dialect: dialect.as_ref() };
    let sql = emitter.emit(ir)?;
    if options.pretty {
        Ok(sqlformat::format(&sql, &QueryParams::None, &default_sqlformat_options()))
    } else {
        Ok(sql)
    }
}

// Shared formatting options for pretty output
pub fn default_sqlformat_options() -> FormatOptions<'static> {
    FormatOptions {
        joins_as_top_level: true,
        indent: Indent::Spaces(2),
        uppercase: Some(true),
        lines_between_queries: 1,
        inline: false,
        max_inline_block: 50,
        max_inline_arguments: Some(40),
        max_inline_top_level: Some(40),
        ..Default::default()
    }
}

struct IrEmitter<'d> {
    dialect: &'d dyn SqlDialect,
}

impl IrEmitter<'_> {
    fn emit(&self, ir: &QueryIR) -> Result<String, QueryIrError> {
        let from = ir
            .from
            .as_ref()
            .ok_or_else(|| QueryIrError::Emit("query has no FROM table".to_string()))?;
        if ir.select.is_empty() {
            return Err(QueryIrError::Emit("query has no SELECT items".to_string()));
        }

        let mut sql = String::from("SELECT ");
        if ir.distinct {
            sql.push_str("DISTINCT ");
        }
        let projection: Vec<String> = ir.select.iter().map(|item| self.select_item(item)).collect();
        sql.push_str(&projection.join(", "));

        sql.push_str(" FROM ");
        sql.push_str(&self.table_ref(from));

        for join in &ir.joins {
            sql.push(' ');
            sql.push_str(&self.join(join));
        }

        if let Some(filter) = ir.filter.as_ref().filter(|g| !g.conditions.is_empty()) {
            sql.push_str(" WHERE ");
            sql.push_str(&self.filter_group(filter)?);
        }

        if let Some(group_by) = ir.group_by.as_ref().filter(|g| !g.columns.is_empty()) {
            let cols: Vec<String> = group_by
                .columns
                .iter()
                .map(|c| self.qualified(c.table.as_deref(), &c.column))
                .collect();
            sql.push_str(" GROUP BY ");
            sql.push_str(&cols.join(", "));
        }

        if let Some(having) = ir.having.as_ref().filter(|g| !g.conditions.is_empty()) {
            sql.push_str(" HAVING ");
            sql.push_str(&self.filter_group(having)?);
        }

        if !ir.order_by.is_empty() {
            let items: Vec<String> = ir.order_by.iter().map(|o| self.order_item(o)).collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&items.join(", "));
        }

        if let Some(limit) = ir.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        Ok(sql)
    }

    fn qualified(&self, table: Option<&str>, column: &str) -> String {
        let column = self.dialect.quote_ident(column);
        match table {
            Some(t) => format!("{}.{}", self.dialect.quote_ident(t), column),
            None => column,
        }
    }

    fn with_alias(&self, expr: String, alias: Option<&str>) -> String {
        match alias {
            Some(a) => format!("{} AS {}", expr, self.dialect.quote_ident(a)),
            None => expr,
        }
    }

    fn aggregate(&self, aggregate: AggregateFunction, table: Option<&str>, column: Option<&str>) -> String {
        match (aggregate, column) {
            (AggregateFunction::CountDistinct, Some(c)) => {
                format!("COUNT(DISTINCT {})", self.qualified(table, c))
            }
            (agg, Some(c)) => format!("{}({})", agg.sql_name(), self.qualified(table, c)),
            (agg, None) => format!("{}(*)", agg.sql_name()),
        }
    }

    fn select_item(&self, item: &SelectItem) -> String {
        match item {
            SelectItem::Column(c) => {
                self.with_alias(self.qualified(c.table.as_deref(), &c.column), c.alias.as_deref())
            }
            SelectItem::Aggregate(a) => self.with_alias(
                self.aggregate(a.aggregate, a.table.as_deref(), a.column.as_deref()),
                a.alias.as_deref(),
            ),
        }
    }

    fn table_ref(&self, t: &TableRef) -> String {
        let name = match &t.schema {
            Some(schema) => format!("{}.{}", self.dialect.quote_ident(schema), self.dialect.quote_ident(&t.table)),
            None => self.dialect.quote_ident(&t.table),
        };
        match &t.alias {
            Some(alias) => format!("{} {}", name, self.dialect.quote_ident(alias)),
            None => name,
        }
    }

    fn join(&self, join: &Join) -> String {
        let kind = match join.kind {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
        };
        let mut out = format!("{} {}", kind, self.table_ref(&join.table));
        let on: Vec<String> = join
            .on
            .iter()
            .map(|c| {
                format!(
                    "{} = {}",
                    self.qualified(Some(&c.left_table), &c.left_column),
                    self.qualified(Some(&c.right_table), &c.right_column)
                )
            })
            .collect();
        if !on.is_empty() {
            out.push_str(" ON ");
            out.push_str(&on.join(" AND "));
        }
        out
    }

    fn filter_group(&self, group: &FilterGroup) -> Result<String, QueryIrError> {
        let parts = group
            .conditions
            .iter()
            .map(|c| self.condition(c))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(parts.join(&format!(" {} ", group.operator.as_sql())))
    }

    fn condition(&self, c: &Condition) -> Result<String, QueryIrError> {
        let lhs = match c.aggregate {
            Some(agg) => {
                let column = (c.column != "*").then_some(c.column.as_str());
                self.aggregate(agg, c.table.as_deref(), column)
            }
            None => self.qualified(c.table.as_deref(), &c.column),
        };
        if !c.operator.needs_operand() {
            return Ok(format!("{} {}", lhs, c.operator.as_sql()));
        }
        let operand = c.operand.as_ref().ok_or_else(|| {
            QueryIrError::Emit(format!("condition on '{}' uses {} without a value", c.column, c.operator.as_sql()))
        })?;
        let rhs = match operand {
            Operand::Param(name) if c.operator == ComparisonOperator::In => format!("(:{})", name),
            Operand::Param(name) => format!(":{}", name),
            Operand::Value(Literal::List(items)) => {
                let rendered: Vec<String> = items.iter().map(|v| self.literal(v)).collect();
                format!("({})", rendered.join(", "))
            }
            // A scalar IN operand is a one-element list.
            Operand::Value(v) if c.operator == ComparisonOperator::In => format!("({})", self.literal(v)),
            Operand::Value(v) => self.literal(v),
        };
        Ok(format!("{} {} {}", lhs, c.operator.as_sql(), rhs))
    }

    fn literal(&self, value: &Literal) -> String {
        match value {
            Literal::Bool(b) => self.dialect.emit_boolean(*b),
            Literal::Number(n) => n.to_string(),
            Literal::String(s) => self.dialect.quote_string(s),
            Literal::List(items) => {
                let rendered: Vec<String> = items.iter().map(|v| self.literal(v)).collect();
                format!("({})", rendered.join(", "))
            }
        }
    }

    fn order_item(&self, item: &OrderByItem) -> String {
        let dir = match item.direction {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        };
        format!("{} {}", self.qualified(item.table.as_deref(), &item.column), dir)
    }
}
