//! SQL text -> `QueryIR`.
//!
//! The accepted surface is deliberately small. Anything the IR cannot hold is
//! reported as an `UnsupportedFeature`, and the converter keeps walking so a
//! single rejection lists every offending construct.

use std::borrow::Cow;
use std::ops::ControlFlow;

use sqlparser::ast as sq;
use sqlparser::dialect::{
    BigQueryDialect, Dialect, DuckDbDialect, GenericDialect, MsSqlDialect, MySqlDialect,
    PostgreSqlDialect, SQLiteDialect, SnowflakeDialect,
};
use sqlparser::parser::Parser;

use super::errors::{QueryIrError, UnsupportedFeature};
use super::ir::{
    AggregateFunction, ColumnRef, ComparisonOperator, Condition, FilterGroup, GroupBy, IR_VERSION,
    Join, JoinCondition, JoinType, Literal, LogicalOperator, Operand, OrderByItem, QueryIR,
    SelectAggregate, SelectColumn, SelectItem, SortDirection, TableRef,
};
use crate::models::enums::{DatabaseType, IdentCase};
use crate::references::compose::substitute_mentions;

#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    pub database_type: DatabaseType,
    /// `@alias` mentions known to the caller. They are parsed as plain tables and
    /// written back into the IR with their `@` prefix.
    pub reference_aliases: Vec<String>,
}

impl ParseOptions {
    pub fn for_database(database_type: DatabaseType) -> Self {
        Self { database_type, reference_aliases: Vec::new() }
    }

    pub fn with_references(mut self, aliases: impl IntoIterator<Item = String>) -> Self {
        self.reference_aliases.extend(aliases);
        self
    }
}

pub fn dialect_for(db_type: DatabaseType) -> Box<dyn Dialect> {
    match db_type {
        DatabaseType::Generic => Box::new(GenericDialect {}),
        DatabaseType::PostgreSQL => Box::new(PostgreSqlDialect {}),
        DatabaseType::MySQL => Box::new(MySqlDialect {}),
        DatabaseType::SQLite => Box::new(SQLiteDialect {}),
        DatabaseType::MsSQL => Box::new(MsSqlDialect {}),
        DatabaseType::DuckDB => Box::new(DuckDbDialect {}),
        DatabaseType::BigQuery => Box::new(BigQueryDialect {}),
        DatabaseType::Snowflake => Box::new(SnowflakeDialect {}),
    }
}

pub fn parse_sql_to_ir(sql: &str, options: &ParseOptions) -> Result<QueryIR, QueryIrError> {
    let prepared: Cow<'_, str> = if options.reference_aliases.is_empty() {
        Cow::Borrowed(sql)
    } else {
        Cow::Owned(substitute_mentions(sql, &options.reference_aliases))
    };
    let trimmed = prepared.trim();
    if trimmed.is_empty() {
        return Err(QueryIrError::Parse("empty query".to_string()));
    }

    let dialect = dialect_for(options.database_type);
    let statements =
        Parser::parse_sql(dialect.as_ref(), trimmed).map_err(|e| QueryIrError::Parse(e.to_string()))?;

    match statements.as_slice() {
        [] => Err(QueryIrError::Parse("empty query".to_string())),
        [sq::Statement::Query(q)] => {
            let mut converter = Converter::new(&options.reference_aliases, options.database_type.ident_case());
            let ir = converter.convert_query(q);
            converter.finish(ir)
        }
        [_] => Err(QueryIrError::Unsupported(vec![UnsupportedFeature::NotASelect])),
        _ => Err(QueryIrError::Unsupported(vec![UnsupportedFeature::MultipleStatements])),
    }
}

/// Aggregates the IR has no variant for.
const OTHER_AGGREGATES: &[&str] = &[
    "ARRAY_AGG",
    "STRING_AGG",
    "GROUP_CONCAT",
    "LISTAGG",
    "STDDEV",
    "STDDEV_POP",
    "STDDEV_SAMP",
    "VARIANCE",
    "VAR_POP",
    "VAR_SAMP",
    "MEDIAN",
    "PERCENTILE_CONT",
    "PERCENTILE_DISC",
    "BOOL_AND",
    "BOOL_OR",
    "ANY_VALUE",
    "APPROX_COUNT_DISTINCT",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Clause {
    Where,
    Having,
}

/// Why an expression could not become a condition operand.
enum OperandIssue {
    Null,
    Column,
    Feature(UnsupportedFeature),
    Complex,
}

enum FilterTarget {
    Column { table: Option<String>, column: String },
    Aggregate { aggregate: AggregateFunction, table: Option<String>, column: String },
    /// Already reported.
    Rejected,
    NotATarget,
}

struct Converter<'a> {
    reference_aliases: &'a [String],
    ident_case: IdentCase,
    unsupported: Vec<UnsupportedFeature>,
}

impl<'a> Converter<'a> {
    fn new(reference_aliases: &'a [String], ident_case: IdentCase) -> Self {
        Self { reference_aliases, ident_case, unsupported: Vec::new() }
    }

    /// The name the database resolves: quoted identifiers verbatim, bare ones folded.
    fn ident(&self, id: &sq::Ident) -> String {
        match id.quote_style {
            Some(_) => id.value.clone(),
            None => self.ident_case.fold(&id.value),
        }
    }

    /// Bare `column` or `table.column`.
    fn column_ref(&self, expr: &sq::Expr) -> Option<(Option<String>, String)> {
        match strip_nested(expr) {
            sq::Expr::Identifier(id) => Some((None, self.ident(id))),
            sq::Expr::CompoundIdentifier(parts) => match parts.as_slice() {
                [table, column] => Some((Some(self.ident(table)), self.ident(column))),
                _ => None,
            },
            _ => None,
        }
    }

    fn reject(&mut self, feature: UnsupportedFeature) {
        if !self.unsupported.contains(&feature) {
            self.unsupported.push(feature);
        }
    }

    /// Report the specific constructs inside `expr`; fall back to `generic` when none is found.
    fn reject_shape(&mut self, expr: &sq::Expr, generic: UnsupportedFeature) {
        if !self.scan(expr) {
            self.reject(generic);
        }
    }

    fn scan(&mut self, expr: &sq::Expr) -> bool {
        let mut found = Vec::new();
        let _ = sq::visit_expressions(expr, |e| {
            if let Some(feature) = specific_feature(e) {
                found.push(feature);
            }
            ControlFlow::<()>::Continue(())
        });
        let hit = !found.is_empty();
        for feature in found {
            self.reject(feature);
        }
        hit
    }

    fn finish(self, ir: QueryIR) -> Result<QueryIR, QueryIrError> {
        if self.unsupported.is_empty() {
            Ok(ir)
        } else {
            log::debug!(
                "rejecting query: {}",
                self.unsupported.iter().map(|f| f.label()).collect::<Vec<_>>().join(", ")
            );
            Err(QueryIrError::Unsupported(self.unsupported))
        }
    }

    fn convert_query(&mut self, q: &sq::Query) -> QueryIR {
        if q.with.is_some() {
            self.reject(UnsupportedFeature::Cte);
        }
        if q.offset.is_some() {
            self.reject(UnsupportedFeature::Offset);
        }
        if q.fetch.is_some() {
            self.reject(UnsupportedFeature::Fetch);
        }
        if !q.locks.is_empty() {
            self.reject(UnsupportedFeature::Locking);
        }

        let mut ir = match q.body.as_ref() {
            sq::SetExpr::Select(sel) => self.convert_select(sel),
            sq::SetExpr::SetOperation { .. } => {
                self.reject(UnsupportedFeature::SetOperation);
                empty_ir()
            }
            sq::SetExpr::Query(_) => {
                self.reject(UnsupportedFeature::Subquery);
                empty_ir()
            }
            _ => {
                self.reject(UnsupportedFeature::NotASelect);
                empty_ir()
            }
        };

        if let Some(ob) = &q.order_by {
            ir.order_by = ob.exprs.iter().filter_map(|o| self.convert_order_item(o)).collect();
        }
        ir.limit = q.limit.as_ref().and_then(|l| self.convert_limit(l));
        ir
    }

    fn convert_select(&mut self, sel: &sq::Select) -> QueryIR {
        let mut ir = empty_ir();

        ir.distinct = match &sel.distinct {
            None => false,
            Some(sq::Distinct::Distinct) => true,
            Some(sq::Distinct::On(_)) => {
                self.reject(UnsupportedFeature::DistinctOn);
                true
            }
        };
        if sel.top.is_some() {
            self.reject(UnsupportedFeature::Top);
        }
        if sel.into.is_some() {
            self.reject(UnsupportedFeature::SelectInto);
        }
        if !sel.named_window.is_empty() {
            self.reject(UnsupportedFeature::WindowFunction);
        }
        if sel.qualify.is_some() {
            self.reject(UnsupportedFeature::Qualify);
        }

        match sel.from.len() {
            0 => self.reject(UnsupportedFeature::MissingFrom),
            1 => {}
            _ => self.reject(UnsupportedFeature::MultipleFrom),
        }
        if let Some(twj) = sel.from.first() {
            ir.from = self.convert_table_factor(&twj.relation);
            ir.joins = twj.joins.iter().filter_map(|j| self.convert_join(j)).collect();
        }
        for extra in sel.from.iter().skip(1) {
            // Still walk extra FROM items so their own problems are listed.
            let _ = self.convert_table_factor(&extra.relation);
        }

        for item in &sel.projection {
            if let Some(converted) = self.convert_select_item(item) {
                ir.select.push(converted);
            }
        }

        ir.filter = sel.selection.as_ref().and_then(|e| self.convert_filter(e, Clause::Where));

        match &sel.group_by {
            sq::GroupByExpr::Expressions(exprs, modifiers) => {
                if !modifiers.is_empty() {
                    self.reject(UnsupportedFeature::GroupByModifiers);
                }
                let mut columns = Vec::with_capacity(exprs.len());
                for e in exprs {
                    match self.column_ref(e) {
                        Some((table, column)) => columns.push(ColumnRef { column, table }),
                        None => self.reject_shape(e, UnsupportedFeature::GroupByExpression),
                    }
                }
                if !columns.is_empty() {
                    ir.group_by = Some(GroupBy { columns });
                }
            }
            _ => self.reject(UnsupportedFeature::GroupByAll),
        }

        ir.having = sel.having.as_ref().and_then(|e| self.convert_filter(e, Clause::Having));
        ir
    }

    fn convert_table_factor(&mut self, factor: &sq::TableFactor) -> Option<TableRef> {
        match factor {
            sq::TableFactor::Table { name, alias, args, .. } => {
                if args.is_some() {
                    self.reject(UnsupportedFeature::TableFunction);
                    return None;
                }
                let (schema, table) = match name.0.as_slice() {
                    [t] if t.quote_style.is_none() && self.is_reference(&t.value) => (None, format!("@{}", t.value)),
                    [t] => (None, self.ident(t)),
                    [s, t] => (Some(self.ident(s)), self.ident(t)),
                    _ => {
                        self.reject(UnsupportedFeature::QualifiedTableName);
                        return None;
                    }
                };
                Some(TableRef {
                    table,
                    alias: alias.as_ref().map(|a| self.ident(&a.name)),
                    schema,
                })
            }
            sq::TableFactor::Derived { .. } => {
                self.reject(UnsupportedFeature::Subquery);
                None
            }
            sq::TableFactor::NestedJoin { .. } => {
                self.reject(UnsupportedFeature::JoinKind("parenthesized".to_string()));
                None
            }
            _ => {
                self.reject(UnsupportedFeature::TableFunction);
                None
            }
        }
    }

    fn is_reference(&self, table: &str) -> bool {
        self.reference_aliases.iter().any(|a| a == table)
    }

    fn convert_join(&mut self, join: &sq::Join) -> Option<Join> {
        let table = self.convert_table_factor(&join.relation);
        let (kind, constraint) = match &join.join_operator {
            sq::JoinOperator::Inner(c) => (JoinType::Inner, c),
            sq::JoinOperator::LeftOuter(c) => (JoinType::Left, c),
            sq::JoinOperator::RightOuter(_) => {
                self.reject(UnsupportedFeature::JoinKind("RIGHT".to_string()));
                return None;
            }
            sq::JoinOperator::FullOuter(_) => {
                self.reject(UnsupportedFeature::JoinKind("FULL".to_string()));
                return None;
            }
            sq::JoinOperator::CrossJoin => {
                self.reject(UnsupportedFeature::JoinKind("CROSS".to_string()));
                return None;
            }
            _ => {
                self.reject(UnsupportedFeature::JoinKind("LATERAL/SEMI/ANTI".to_string()));
                return None;
            }
        };
        let on = match constraint {
            sq::JoinConstraint::On(expr) => self.convert_join_on(expr),
            sq::JoinConstraint::Using(_) | sq::JoinConstraint::Natural => {
                self.reject(UnsupportedFeature::JoinUsing);
                None
            }
            sq::JoinConstraint::None => {
                self.reject(UnsupportedFeature::JoinKind("CROSS".to_string()));
                None
            }
        };
        Some(Join { kind, table: table?, on: on? })
    }

    fn convert_join_on(&mut self, expr: &sq::Expr) -> Option<Vec<JoinCondition>> {
        let mut leaves = Vec::new();
        flatten_logic(expr, &sq::BinaryOperator::And, &mut leaves);
        let mut out = Vec::with_capacity(leaves.len());
        let mut ok = true;
        for leaf in leaves {
            let converted = match strip_nested(leaf) {
                sq::Expr::BinaryOp { left, op: sq::BinaryOperator::Eq, right } => {
                    match (self.column_ref(left), self.column_ref(right)) {
                        (Some((Some(lt), lc)), Some((Some(rt), rc))) => Some(JoinCondition {
                            left_table: lt,
                            left_column: lc,
                            right_table: rt,
                            right_column: rc,
                        }),
                        (Some(_), Some(_)) => {
                            self.reject(UnsupportedFeature::UnqualifiedJoinColumn);
                            None
                        }
                        _ => {
                            self.reject_shape(leaf, UnsupportedFeature::NonEqualityJoin);
                            None
                        }
                    }
                }
                other => {
                    self.reject_shape(other, UnsupportedFeature::NonEqualityJoin);
                    None
                }
            };
            match converted {
                Some(c) => out.push(c),
                None => ok = false,
            }
        }
        ok.then_some(out)
    }

    fn convert_select_item(&mut self, item: &sq::SelectItem) -> Option<SelectItem> {
        match item {
            sq::SelectItem::Wildcard(_) => Some(SelectItem::Column(SelectColumn {
                column: "*".to_string(),
                table: None,
                alias: None,
            })),
            sq::SelectItem::QualifiedWildcard(name, _) => match name.0.as_slice() {
                [table] => Some(SelectItem::Column(SelectColumn {
                    column: "*".to_string(),
                    table: Some(self.ident(table)),
                    alias: None,
                })),
                _ => {
                    self.reject(UnsupportedFeature::QualifiedTableName);
                    None
                }
            },
            sq::SelectItem::UnnamedExpr(expr) => self.convert_projection(expr, None),
            sq::SelectItem::ExprWithAlias { expr, alias } => {
                self.convert_projection(expr, Some(self.ident(alias)))
            }
        }
    }

    fn convert_projection(&mut self, expr: &sq::Expr, alias: Option<String>) -> Option<SelectItem> {
        if let Some((table, column)) = self.column_ref(expr) {
            return Some(SelectItem::Column(SelectColumn { column, table, alias }));
        }
        match strip_nested(expr) {
            sq::Expr::Function(func) => match aggregate_of(func) {
                Some(aggregate) => {
                    let (aggregate, table, column) = self.aggregate_parts(func, aggregate)?;
                    Some(SelectItem::Aggregate(SelectAggregate { aggregate, column, table, alias }))
                }
                None => {
                    let name = function_name(func).to_ascii_uppercase();
                    let generic = if OTHER_AGGREGATES.contains(&name.as_str()) {
                        UnsupportedFeature::UnsupportedAggregate(name)
                    } else {
                        UnsupportedFeature::ScalarFunction(name)
                    };
                    self.reject_shape(expr, generic);
                    None
                }
            },
            other => {
                self.reject_shape(other, UnsupportedFeature::ComplexProjection);
                None
            }
        }
    }

    /// `(function, table, column)`; column `None` only for `COUNT(*)`.
    fn aggregate_parts(
        &mut self,
        func: &sq::Function,
        aggregate: AggregateFunction,
    ) -> Option<(AggregateFunction, Option<String>, Option<String>)> {
        if func.over.is_some() {
            self.reject(UnsupportedFeature::WindowFunction);
            return None;
        }
        if func.filter.is_some() || !func.within_group.is_empty() {
            self.reject(UnsupportedFeature::AggregateFilter);
            return None;
        }
        let list = match &func.args {
            sq::FunctionArguments::List(list) => list,
            sq::FunctionArguments::Subquery(_) => {
                self.reject(UnsupportedFeature::Subquery);
                return None;
            }
            sq::FunctionArguments::None => {
                self.reject(UnsupportedFeature::ComplexAggregate);
                return None;
            }
        };
        let distinct = matches!(list.duplicate_treatment, Some(sq::DuplicateTreatment::Distinct));
        if !list.clauses.is_empty() || list.args.len() != 1 {
            for arg in &list.args {
                if let sq::FunctionArg::Unnamed(sq::FunctionArgExpr::Expr(e)) = arg {
                    self.scan(e);
                }
            }
            self.reject(UnsupportedFeature::ComplexAggregate);
            return None;
        }

        match &list.args[0] {
            sq::FunctionArg::Unnamed(sq::FunctionArgExpr::Wildcard)
                if aggregate == AggregateFunction::Count && !distinct =>
            {
                Some((AggregateFunction::Count, None, None))
            }
            sq::FunctionArg::Unnamed(sq::FunctionArgExpr::Expr(e)) => match self.column_ref(e) {
                Some((table, column)) => {
                    let aggregate = match (aggregate, distinct) {
                        (AggregateFunction::Count, true) => AggregateFunction::CountDistinct,
                        (other, false) => other,
                        (_, true) => {
                            self.reject(UnsupportedFeature::DistinctAggregate);
                            return None;
                        }
                    };
                    Some((aggregate, table, Some(column)))
                }
                None => {
                    self.reject_shape(e, UnsupportedFeature::ComplexAggregate);
                    None
                }
            },
            _ => {
                self.reject(UnsupportedFeature::ComplexAggregate);
                None
            }
        }
    }

    fn convert_filter(&mut self, expr: &sq::Expr, clause: Clause) -> Option<FilterGroup> {
        let root = strip_nested(expr);
        let operator = match root {
            sq::Expr::BinaryOp { op: sq::BinaryOperator::Or, .. } => LogicalOperator::Or,
            _ => LogicalOperator::And,
        };
        let sq_op = match operator {
            LogicalOperator::And => sq::BinaryOperator::And,
            LogicalOperator::Or => sq::BinaryOperator::Or,
        };

        let mut leaves = Vec::new();
        flatten_logic(root, &sq_op, &mut leaves);

        let mut conditions = Vec::with_capacity(leaves.len());
        let mut ok = true;
        for leaf in leaves {
            match self.convert_condition(leaf, clause) {
                Some(c) => conditions.push(c),
                None => ok = false,
            }
        }
        ok.then_some(FilterGroup { operator, conditions })
    }

    fn convert_condition(&mut self, leaf: &sq::Expr, clause: Clause) -> Option<Condition> {
        let leaf = strip_nested(leaf);
        match leaf {
            sq::Expr::BinaryOp { op: sq::BinaryOperator::And | sq::BinaryOperator::Or, .. } => {
                self.reject(UnsupportedFeature::NestedLogic);
                self.scan(leaf);
                None
            }
            sq::Expr::IsNull(inner) => self.unary_condition(inner, ComparisonOperator::IsNull, clause),
            sq::Expr::IsNotNull(inner) => {
                self.unary_condition(inner, ComparisonOperator::IsNotNull, clause)
            }
            sq::Expr::Like { negated: false, expr, pattern, escape_char, .. } => {
                if escape_char.is_some() {
                    self.reject(UnsupportedFeature::LikeEscape);
                    return None;
                }
                self.binary_condition(expr, ComparisonOperator::Like, pattern, clause, leaf)
            }
            sq::Expr::InList { expr, list, negated: false } => self.in_condition(expr, list, clause, leaf),
            sq::Expr::BinaryOp { left, op, right } => match comparison_operator(op) {
                Some(operator) => self.binary_condition(left, operator, right, clause, leaf),
                None => {
                    self.reject_shape(leaf, UnsupportedFeature::ComplexFilter);
                    None
                }
            },
            other => {
                self.reject_shape(other, UnsupportedFeature::ComplexFilter);
                None
            }
        }
    }

    fn filter_target(&mut self, expr: &sq::Expr, clause: Clause) -> FilterTarget {
        if let Some((table, column)) = self.column_ref(expr) {
            return FilterTarget::Column { table, column };
        }
        if let sq::Expr::Function(func) = strip_nested(expr)
            && let Some(aggregate) = aggregate_of(func)
        {
            if clause == Clause::Where {
                self.reject(UnsupportedFeature::AggregateInWhere);
                return FilterTarget::Rejected;
            }
            return match self.aggregate_parts(func, aggregate) {
                Some((aggregate, table, column)) => FilterTarget::Aggregate {
                    aggregate,
                    table,
                    column: column.unwrap_or_else(|| "*".to_string()),
                },
                None => FilterTarget::Rejected,
            };
        }
        FilterTarget::NotATarget
    }

    fn unary_condition(
        &mut self,
        inner: &sq::Expr,
        operator: ComparisonOperator,
        clause: Clause,
    ) -> Option<Condition> {
        match self.filter_target(inner, clause) {
            FilterTarget::NotATarget => {
                self.reject_shape(inner, UnsupportedFeature::ComplexFilter);
                None
            }
            FilterTarget::Rejected => None,
            target => Some(condition_from(target, operator, None)),
        }
    }

    fn binary_condition(
        &mut self,
        left: &sq::Expr,
        operator: ComparisonOperator,
        right: &sq::Expr,
        clause: Clause,
        whole: &sq::Expr,
    ) -> Option<Condition> {
        match self.filter_target(left, clause) {
            FilterTarget::Rejected => None,
            FilterTarget::NotATarget => {
                // `10 < age` is the same predicate as `age > 10`.
                let flippable = operator != ComparisonOperator::Like && classify_operand(left).is_ok();
                if flippable {
                    match self.filter_target(right, clause) {
                        FilterTarget::Rejected => None,
                        FilterTarget::NotATarget => {
                            self.reject_shape(whole, UnsupportedFeature::ComplexFilter);
                            None
                        }
                        target => {
                            let operand = self.operand_or_reject(left)?;
                            Some(condition_from(target, operator.mirrored(), Some(operand)))
                        }
                    }
                } else {
                    self.reject_shape(whole, UnsupportedFeature::ComplexFilter);
                    None
                }
            }
            target => {
                let operand = self.operand_or_reject(right)?;
                Some(condition_from(target, operator, Some(operand)))
            }
        }
    }

    fn in_condition(
        &mut self,
        expr: &sq::Expr,
        list: &[sq::Expr],
        clause: Clause,
        whole: &sq::Expr,
    ) -> Option<Condition> {
        let target = match self.filter_target(expr, clause) {
            FilterTarget::Rejected => return None,
            FilterTarget::NotATarget => {
                self.reject_shape(whole, UnsupportedFeature::ComplexFilter);
                return None;
            }
            t => t,
        };

        if let [single] = list
            && let Ok(Operand::Param(name)) = classify_operand(single)
        {
            return Some(condition_from(target, ComparisonOperator::In, Some(Operand::Param(name))));
        }

        let mut values = Vec::with_capacity(list.len());
        for item in list {
            match self.operand_or_reject(item)? {
                Operand::Value(v) => values.push(v),
                Operand::Param(_) => {
                    self.reject(UnsupportedFeature::ComplexFilter);
                    return None;
                }
            }
        }
        Some(condition_from(
            target,
            ComparisonOperator::In,
            Some(Operand::Value(Literal::List(values))),
        ))
    }

    fn operand_or_reject(&mut self, expr: &sq::Expr) -> Option<Operand> {
        match classify_operand(expr) {
            Ok(operand) => Some(operand),
            Err(OperandIssue::Null) => {
                self.reject(UnsupportedFeature::NullComparison);
                None
            }
            Err(OperandIssue::Column) => {
                self.reject(UnsupportedFeature::ColumnComparison);
                None
            }
            Err(OperandIssue::Feature(f)) => {
                self.reject(f);
                None
            }
            Err(OperandIssue::Complex) => {
                self.reject_shape(expr, UnsupportedFeature::ComplexFilter);
                None
            }
        }
    }

    fn convert_order_item(&mut self, item: &sq::OrderByExpr) -> Option<OrderByItem> {
        if item.nulls_first.is_some() {
            self.reject(UnsupportedFeature::OrderByNulls);
        }
        match self.column_ref(&item.expr) {
            Some((table, column)) => Some(OrderByItem {
                column,
                table,
                direction: match item.asc {
                    Some(false) => SortDirection::Desc,
                    _ => SortDirection::Asc,
                },
            }),
            None => {
                self.reject_shape(&item.expr, UnsupportedFeature::OrderByExpression);
                None
            }
        }
    }

    fn convert_limit(&mut self, limit: &sq::Expr) -> Option<u64> {
        if let sq::Expr::Value(sq::Value::Number(n, _)) = limit
            && let Ok(v) = n.parse::<u64>()
        {
            return Some(v);
        }
        self.reject(UnsupportedFeature::NonLiteralLimit);
        None
    }
}

fn empty_ir() -> QueryIR {
    QueryIR {
        version: IR_VERSION,
        distinct: false,
        select: Vec::new(),
        from: None,
        joins: Vec::new(),
        filter: None,
        group_by: None,
        having: None,
        order_by: Vec::new(),
        limit: None,
    }
}

fn condition_from(target: FilterTarget, operator: ComparisonOperator, operand: Option<Operand>) -> Condition {
    match target {
        FilterTarget::Column { table, column } => {
            Condition { column, table, aggregate: None, operator, operand }
        }
        FilterTarget::Aggregate { aggregate, table, column } => {
            Condition { column, table, aggregate: Some(aggregate), operator, operand }
        }
        // Callers filter these out before building a condition.
        FilterTarget::Rejected | FilterTarget::NotATarget => {
            Condition { column: String::new(), table: None, aggregate: None, operator, operand }
        }
    }
}

fn strip_nested(mut expr: &sq::Expr) -> &sq::Expr {
    while let sq::Expr::Nested(inner) = expr {
        expr = inner.as_ref();
    }
    expr
}

/// Collect the leaves of a chain of `op`, looking through parentheses.
fn flatten_logic<'e>(expr: &'e sq::Expr, op: &sq::BinaryOperator, out: &mut Vec<&'e sq::Expr>) {
    match strip_nested(expr) {
        sq::Expr::BinaryOp { left, op: o, right } if o == op => {
            flatten_logic(left, op, out);
            flatten_logic(right, op, out);
        }
        other => out.push(other),
    }
}

fn function_name(func: &sq::Function) -> &str {
    func.name.0.last().map(|i| i.value.as_str()).unwrap_or_default()
}

fn aggregate_of(func: &sq::Function) -> Option<AggregateFunction> {
    if func.name.0.len() != 1 {
        return None;
    }
    AggregateFunction::from_sql_name(function_name(func))
}

fn comparison_operator(op: &sq::BinaryOperator) -> Option<ComparisonOperator> {
    Some(match op {
        sq::BinaryOperator::Eq => ComparisonOperator::Eq,
        sq::BinaryOperator::NotEq => ComparisonOperator::NotEq,
        sq::BinaryOperator::Gt => ComparisonOperator::Gt,
        sq::BinaryOperator::Lt => ComparisonOperator::Lt,
        sq::BinaryOperator::GtEq => ComparisonOperator::GtEq,
        sq::BinaryOperator::LtEq => ComparisonOperator::LtEq,
        _ => return None,
    })
}

fn classify_operand(expr: &sq::Expr) -> Result<Operand, OperandIssue> {
    match strip_nested(expr) {
        sq::Expr::Value(value) => literal_from_value(value, false),
        sq::Expr::UnaryOp { op: sq::UnaryOperator::Minus, expr: inner } => match strip_nested(inner) {
            sq::Expr::Value(value @ sq::Value::Number(..)) => literal_from_value(value, true),
            _ => Err(OperandIssue::Complex),
        },
        sq::Expr::UnaryOp { op: sq::UnaryOperator::Plus, expr: inner } => match strip_nested(inner) {
            sq::Expr::Value(value @ sq::Value::Number(..)) => literal_from_value(value, false),
            _ => Err(OperandIssue::Complex),
        },
        sq::Expr::Identifier(_) | sq::Expr::CompoundIdentifier(_) => Err(OperandIssue::Column),
        _ => Err(OperandIssue::Complex),
    }
}

fn literal_from_value(value: &sq::Value, negative: bool) -> Result<Operand, OperandIssue> {
    let unsupported = |kind: &str| Err(OperandIssue::Feature(UnsupportedFeature::UnsupportedLiteral(kind.to_string())));
    match value {
        sq::Value::Number(n, _) => parse_number(n, negative).map(|num| Operand::Value(Literal::Number(num))),
        sq::Value::SingleQuotedString(s) | sq::Value::DoubleQuotedString(s) => {
            Ok(Operand::Value(Literal::String(s.clone())))
        }
        sq::Value::Boolean(b) => Ok(Operand::Value(Literal::Bool(*b))),
        sq::Value::Null => Err(OperandIssue::Null),
        sq::Value::Placeholder(p) => match p.strip_prefix(':') {
            Some(name) if is_identifier(name) => Ok(Operand::Param(name.to_string())),
            _ => unsupported("positional parameter"),
        },
        sq::Value::NationalStringLiteral(_) => unsupported("national string"),
        sq::Value::HexStringLiteral(_) => unsupported("hex string"),
        sq::Value::EscapedStringLiteral(_) => unsupported("escaped string"),
        sq::Value::DollarQuotedString(_) => unsupported("dollar-quoted string"),
        _ => unsupported("special"),
    }
}

fn parse_number(text: &str, negative: bool) -> Result<serde_json::Number, OperandIssue> {
    let signed = if negative { format!("-{}", text) } else { text.to_string() };
    if let Ok(i) = signed.parse::<i64>() {
        return Ok(serde_json::Number::from(i));
    }
    if let Ok(u) = signed.parse::<u64>() {
        return Ok(serde_json::Number::from(u));
    }
    let is_integer_text = text.chars().all(|c| c.is_ascii_digit());
    if !is_integer_text
        && let Ok(f) = signed.parse::<f64>()
        && let Some(n) = serde_json::Number::from_f64(f)
    {
        if decimal_parts(&signed) != decimal_parts(&f.to_string()) {
            return Err(OperandIssue::Feature(UnsupportedFeature::InexactNumber(signed)));
        }
        return Ok(n);
    }
    Err(OperandIssue::Feature(UnsupportedFeature::NumberOutOfRange(signed)))
}

/// Significant digits and power-of-ten exponent of a decimal literal, so
/// `1.50`, `15e-1` and `1.5` compare equal.
fn decimal_parts(text: &str) -> Option<(String, i64)> {
    let unsigned = text.trim_start_matches(['-', '+']);
    let (mantissa, mut exp) = match unsigned.split_once(['e', 'E']) {
        Some((m, e)) => (m, e.parse::<i64>().ok()?),
        None => (unsigned, 0),
    };
    let (int, frac) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if !int.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
        return None;
    }
    exp -= i64::try_from(frac.len()).ok()?;
    let joined = format!("{}{}", int, frac);
    let mut digits = joined.trim_start_matches('0').to_string();
    if digits.is_empty() {
        return Some(("0".to_string(), 0));
    }
    while digits.ends_with('0') {
        digits.pop();
        exp += 1;
    }
    Some((digits, exp))
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Constructs that are rejected wherever they appear.
fn specific_feature(expr: &sq::Expr) -> Option<UnsupportedFeature> {
    match expr {
        sq::Expr::Subquery(_) | sq::Expr::InSubquery { .. } | sq::Expr::Exists { .. } => {
            Some(UnsupportedFeature::Subquery)
        }
        sq::Expr::Case { .. } => Some(UnsupportedFeature::Case),
        sq::Expr::Function(f) if f.over.is_some() => Some(UnsupportedFeature::WindowFunction),
        sq::Expr::Between { .. } => Some(UnsupportedFeature::Between),
        sq::Expr::Like { negated: true, .. } => Some(UnsupportedFeature::NotLike),
        sq::Expr::ILike { .. } => Some(UnsupportedFeature::ILike),
        sq::Expr::InList { negated: true, .. } => Some(UnsupportedFeature::NotIn),
        sq::Expr::SimilarTo { .. } | sq::Expr::RLike { .. } => Some(UnsupportedFeature::Regex),
        sq::Expr::BinaryOp {
            op:
                sq::BinaryOperator::PGRegexMatch
                | sq::BinaryOperator::PGRegexIMatch
                | sq::BinaryOperator::PGRegexNotMatch
                | sq::BinaryOperator::PGRegexNotIMatch,
            ..
        } => Some(UnsupportedFeature::Regex),
        sq::Expr::UnaryOp { op: sq::UnaryOperator::Not, .. } => Some(UnsupportedFeature::NotExpression),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(sql: &str) -> Result<QueryIR, QueryIrError> {
        parse_sql_to_ir(sql, &ParseOptions::default())
    }

    fn rejected(sql: &str) -> Vec<String> {
        match parse(sql) {
            Err(e) => e.unsupported_features(),
            Ok(ir) => panic!("expected rejection for {sql}, got {ir:?}"),
        }
    }

    #[test]
    fn simple_projection_and_from() {
        let ir = parse("select id, u.name as n from public.users u").expect("ok");
        assert_eq!(
            ir.from,
            Some(TableRef { table: "users".into(), alias: Some("u".into()), schema: Some("public".into()) })
        );
        assert_eq!(
            ir.select[1],
            SelectItem::Column(SelectColumn { column: "name".into(), table: Some("u".into()), alias: Some("n".into()) })
        );
    }

    #[test]
    fn count_star_and_count_column_differ() {
        let star = parse("SELECT COUNT(*) FROM t").expect("ok");
        let col = parse("SELECT COUNT(id) FROM t").expect("ok");
        match (&star.select[0], &col.select[0]) {
            (SelectItem::Aggregate(a), SelectItem::Aggregate(b)) => {
                assert_eq!(a.column, None);
                assert_eq!(b.column.as_deref(), Some("id"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn count_distinct() {
        let ir = parse("SELECT COUNT(DISTINCT o.user_id) AS u FROM orders o").expect("ok");
        assert_eq!(
            ir.select[0],
            SelectItem::Aggregate(SelectAggregate {
                aggregate: AggregateFunction::CountDistinct,
                column: Some("user_id".into()),
                table: Some("o".into()),
                alias: Some("u".into()),
            })
        );
    }

    #[test]
    fn where_chain_and_params() {
        let ir = parse("SELECT * FROM t WHERE a = 1 AND (b LIKE 'x%' AND c IN (1, 2)) AND d >= :start AND e IS NOT NULL")
            .expect("ok");
        let f = ir.filter.expect("where");
        assert_eq!(f.operator, LogicalOperator::And);
        assert_eq!(f.conditions.len(), 5);
        assert_eq!(f.conditions[3].param_name(), Some("start"));
        assert_eq!(f.conditions[4].operator, ComparisonOperator::IsNotNull);
        assert_eq!(f.conditions[4].operand, None);
    }

    #[test]
    fn or_group() {
        let ir = parse("SELECT * FROM t WHERE a = 'x' OR a = 'y'").expect("ok");
        assert_eq!(ir.filter.unwrap().operator, LogicalOperator::Or);
    }

    #[test]
    fn mixed_logic_rejected() {
        let f = rejected("SELECT * FROM t WHERE a = 1 AND (b = 2 OR c = 3)");
        assert!(f.contains(&"nested AND/OR conditions".to_string()), "{f:?}");
    }

    #[test]
    fn literal_on_left_is_mirrored() {
        let ir = parse("SELECT * FROM t WHERE 10 < age").expect("ok");
        let c = &ir.filter.unwrap().conditions[0];
        assert_eq!(c.column, "age");
        assert_eq!(c.operator, ComparisonOperator::Gt);
    }

    #[test]
    fn negative_and_decimal_numbers() {
        let ir = parse("SELECT * FROM t WHERE a > -5 AND b < 2.5").expect("ok");
        let conds = ir.filter.unwrap().conditions;
        assert_eq!(conds[0].operand, Some(Operand::Value(Literal::Number((-5).into()))));
        assert_eq!(
            conds[1].operand,
            Some(Operand::Value(Literal::Number(serde_json::Number::from_f64(2.5).unwrap())))
        );
    }

    #[test]
    fn having_on_aggregate() {
        let ir = parse("SELECT user_id, COUNT(*) FROM logins GROUP BY user_id HAVING COUNT(*) > 2").expect("ok");
        let h = ir.having.expect("having");
        assert_eq!(h.conditions[0].aggregate, Some(AggregateFunction::Count));
        assert_eq!(h.conditions[0].column, "*");
    }

    #[test]
    fn joins_with_multiple_equalities() {
        let ir = parse(
            "SELECT a.id FROM accounts a LEFT JOIN sessions s ON a.id = s.account_id AND a.region = s.region JOIN users u ON u.id = a.user_id",
        )
        .expect("ok");
        assert_eq!(ir.joins.len(), 2);
        assert_eq!(ir.joins[0].kind, JoinType::Left);
        assert_eq!(ir.joins[0].on.len(), 2);
        assert_eq!(ir.joins[1].kind, JoinType::Inner);
        assert_eq!(ir.joins[1].on[0].left_table, "u");
    }

    #[test]
    fn rejects_each_listed_feature() {
        let cases = [
            ("SELECT * FROM t WHERE id IN (SELECT id FROM u)", "subqueries"),
            ("SELECT * FROM (SELECT 1 AS a) x", "subqueries"),
            ("WITH c AS (SELECT 1) SELECT * FROM c", "CTEs (WITH clause)"),
            ("SELECT a FROM t UNION SELECT a FROM u", "UNION/INTERSECT/EXCEPT"),
            ("SELECT CASE WHEN a > 1 THEN 1 ELSE 0 END FROM t", "CASE expressions"),
            ("SELECT SUM(CASE WHEN a > 1 THEN 1 ELSE 0 END) FROM t", "CASE expressions"),
            ("SELECT ROW_NUMBER() OVER (ORDER BY a) FROM t", "window functions"),
            ("SELECT * FROM t WHERE a BETWEEN 1 AND 2", "BETWEEN (use >= and <= instead)"),
            ("SELECT * FROM t WHERE a NOT LIKE 'x%'", "NOT LIKE"),
            ("SELECT * FROM t WHERE a NOT IN (1, 2)", "NOT IN"),
            ("SELECT * FROM t WHERE a ~ '^x'", "regex operators"),
            ("SELECT SUM(a * b) FROM t", "complex aggregate expressions"),
            ("SELECT * FROM t WHERE a + b > 10", "complex filter expressions"),
        ];
        for (sql, feature) in cases {
            let dialect = if sql.contains('~') { DatabaseType::PostgreSQL } else { DatabaseType::Generic };
            let err = parse_sql_to_ir(sql, &ParseOptions::for_database(dialect)).expect_err(sql);
            let features = err.unsupported_features();
            assert!(features.iter().any(|f| f == feature), "{sql}: {features:?}");
        }
    }

    #[test]
    fn reports_all_violations() {
        let f = rejected("SELECT SUM(a * b) FROM t WHERE x BETWEEN 1 AND 2 AND y NOT IN (1) ORDER BY 1 OFFSET 5");
        for expected in [
            "complex aggregate expressions",
            "BETWEEN (use >= and <= instead)",
            "NOT IN",
            "expressions in ORDER BY",
            "OFFSET",
        ] {
            assert!(f.iter().any(|x| x == expected), "missing {expected}: {f:?}");
        }
    }

    #[test]
    fn non_select_and_multi_statement() {
        assert_eq!(rejected("DELETE FROM t"), vec!["non-SELECT statements".to_string()]);
        assert_eq!(rejected("SELECT 1 FROM a; SELECT 2 FROM b"), vec!["multiple statements".to_string()]);
        assert!(matches!(parse("SELEC * FROM"), Err(QueryIrError::Parse(_))));
        assert!(matches!(parse("   "), Err(QueryIrError::Parse(_))));
    }

    #[test]
    fn misc_rejections() {
        assert!(rejected("SELECT * FROM t WHERE a = NULL").contains(&"comparison with NULL (use IS NULL / IS NOT NULL)".into()));
        assert!(rejected("SELECT * FROM t WHERE COUNT(*) > 1").contains(&"aggregates in WHERE (use HAVING)".into()));
        assert!(rejected("SELECT * FROM a, b").contains(&"multiple FROM tables (use JOIN)".into()));
        assert!(rejected("SELECT * FROM a RIGHT JOIN b ON a.id = b.id").contains(&"RIGHT JOIN".into()));
        assert!(rejected("SELECT * FROM a JOIN b ON a.id > b.id").contains(&"non-equality JOIN conditions".into()));
        assert!(rejected("SELECT UPPER(name) FROM t").contains(&"function UPPER()".into()));
        assert!(rejected("SELECT STRING_AGG(name, ',') FROM t").contains(&"aggregate STRING_AGG()".into()));
        assert!(rejected("SELECT SUM(DISTINCT x) FROM t").contains(&"DISTINCT inside aggregates other than COUNT".into()));
        assert!(rejected("SELECT * FROM t WHERE a = b").contains(&"column-to-column comparisons".into()));
        assert!(rejected("SELECT * FROM t WHERE NOT (a = 1)").contains(&"NOT expressions".into()));
    }

    #[test]
    fn reference_aliases_round_trip_with_at_prefix() {
        let opts = ParseOptions::default().with_references(vec!["orders_5".to_string()]);
        let ir = parse_sql_to_ir("SELECT * FROM @orders_5 o JOIN users u ON u.id = o.user_id", &opts).expect("ok");
        assert_eq!(ir.from.as_ref().unwrap().table, "@orders_5");
        assert_eq!(ir.from.unwrap().alias.as_deref(), Some("o"));
    }

    #[test]
    fn order_by_and_limit() {
        let ir = parse("SELECT a FROM t ORDER BY t.a DESC, b LIMIT 25").expect("ok");
        assert_eq!(ir.order_by.len(), 2);
        assert_eq!(ir.order_by[0].direction, SortDirection::Desc);
        assert_eq!(ir.order_by[0].table.as_deref(), Some("t"));
        assert_eq!(ir.order_by[1].direction, SortDirection::Asc);
        assert_eq!(ir.limit, Some(25));
    }

    #[test]
    fn decimals_beyond_double_precision_are_rejected() {
        let f = rejected("SELECT * FROM products WHERE price = 0.12345678901234567890");
        assert!(f.contains(&"numeric literal 0.12345678901234567890 (more precision than a double holds)".to_string()), "{f:?}");

        let ir = parse("SELECT * FROM products WHERE price = 19.990 AND rate < 0.0015").expect("ok");
        let conds = ir.filter.unwrap().conditions;
        assert_eq!(conds[0].operand, Some(Operand::Value(Literal::Number(serde_json::Number::from_f64(19.99).unwrap()))));
        assert_eq!(conds[1].operand, Some(Operand::Value(Literal::Number(serde_json::Number::from_f64(0.0015).unwrap()))));
    }

    #[test]
    fn decimal_parts_normalize_notation() {
        assert_eq!(decimal_parts("1.50"), decimal_parts("15e-1"));
        assert_eq!(decimal_parts("-0.0015"), Some(("15".to_string(), -4)));
        assert_eq!(decimal_parts("0.000"), Some(("0".to_string(), 0)));
        assert_ne!(decimal_parts("0.12345678901234567890"), decimal_parts("0.12345678901234568"));
    }

    #[test]
    fn quoted_identifiers_keep_their_case_and_bare_ones_fold() {
        let pg = ParseOptions::for_database(DatabaseType::PostgreSQL);
        let ir = parse_sql_to_ir(r#"SELECT "UserId", Email FROM "Users" AS "U""#, &pg).expect("ok");
        match &ir.select[0] {
            SelectItem::Column(c) => assert_eq!(c.column, "UserId"),
            other => panic!("unexpected {other:?}"),
        }
        match &ir.select[1] {
            SelectItem::Column(c) => assert_eq!(c.column, "email"),
            other => panic!("unexpected {other:?}"),
        }
        let from = ir.from.unwrap();
        assert_eq!(from.table, "Users");
        assert_eq!(from.alias.as_deref(), Some("U"));

        let snow = parse_sql_to_ir("SELECT id FROM users", &ParseOptions::for_database(DatabaseType::Snowflake)).expect("ok");
        assert_eq!(snow.from.unwrap().table, "USERS");

        let mysql = parse_sql_to_ir("SELECT UserId FROM Users", &ParseOptions::for_database(DatabaseType::MySQL)).expect("ok");
        assert_eq!(mysql.from.unwrap().table, "Users");
    }

    #[test]
    fn quoted_reserved_words_parse_as_columns() {
        let ir = parse(r#"SELECT "from", "order" FROM t"#).expect("ok");
        let cols: Vec<&str> = ir
            .select
            .iter()
            .filter_map(|s| match s {
                SelectItem::Column(c) => Some(c.column.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(cols, vec!["from", "order"]);
    }

    #[test]
    fn in_with_single_param() {
        let ir = parse("SELECT * FROM t WHERE status IN (:statuses)").expect("ok");
        assert_eq!(ir.filter.unwrap().conditions[0].param_name(), Some("statuses"));
    }
}
