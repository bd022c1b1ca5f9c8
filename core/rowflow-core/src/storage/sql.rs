//! SQL subset for the memory store
//!
//! sqlparser-rs AST → [`StorePlan`] 변환. Only what the streaming layer and
//! its callers issue is supported: single-table SELECT with WHERE / ORDER BY /
//! LIMIT / OFFSET, `COUNT(*)`, INSERT ... VALUES, UPDATE, DELETE and
//! CREATE TABLE. Parameters are `?` (numbered left to right) or `$N`.

use crate::error::{FlowError, FlowResult};
use crate::storage::value::ScalarValue;
use sqlparser::ast::{
    BinaryOperator as SqlBinaryOp, Expr as SqlExpr, FromTable, FunctionArg, FunctionArgExpr,
    FunctionArguments, Query, Select, SelectItem, SetExpr, Statement, TableFactor,
    TableWithJoins, UnaryOperator, Value,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use std::cell::Cell;
use std::cmp::Ordering;

/// Comparison and logical operators understood by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

/// Row-level expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(String),
    Literal(ScalarValue),
    /// Zero-based index into the statement parameters
    Param(usize),
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },
    IsNull(Box<Expr>),
    IsNotNull(Box<Expr>),
}

/// SELECT 절
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    All,
    Columns(Vec<String>),
    /// `COUNT(*)`, reported under the given column name
    Count(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub column: String,
    pub asc: bool,
}

/// Parsed statement, ready to run against a table set.
#[derive(Debug, Clone, PartialEq)]
pub enum StorePlan {
    CreateTable {
        table: String,
        columns: Vec<String>,
        if_not_exists: bool,
    },
    Insert {
        table: String,
        columns: Vec<String>,
        rows: Vec<Vec<Expr>>,
    },
    Select {
        table: String,
        projection: Projection,
        filter: Option<Expr>,
        order_by: Vec<SortKey>,
        limit: Option<Expr>,
        offset: Option<Expr>,
    },
    Update {
        table: String,
        assignments: Vec<(String, Expr)>,
        filter: Option<Expr>,
    },
    Delete {
        table: String,
        filter: Option<Expr>,
    },
}

impl StorePlan {
    pub fn is_query(&self) -> bool {
        matches!(self, StorePlan::Select { .. })
    }
}

/// Parses exactly one statement into a [`StorePlan`].
pub fn parse(sql: &str) -> FlowResult<StorePlan> {
    let mut statements =
        Parser::parse_sql(&GenericDialect {}, sql).map_err(|e| FlowError::SqlParse {
            message: e.to_string(),
            sql: sql.to_string(),
        })?;
    if statements.len() != 1 {
        return Err(FlowError::SqlParse {
            message: format!("expected exactly one statement, got {}", statements.len()),
            sql: sql.to_string(),
        });
    }
    let statement = statements.remove(0);
    StorePlanner::default().plan(&statement)
}

/// AST → StorePlan 변환기
///
/// Tracks the next `?` index while walking the statement in source order.
#[derive(Default)]
struct StorePlanner {
    next_param: Cell<usize>,
}

impl StorePlanner {
    fn plan(&self, statement: &Statement) -> FlowResult<StorePlan> {
        match statement {
            Statement::Query(query) => self.plan_query(query),
            Statement::Insert(insert) => {
                let table = insert.table_name.to_string();
                let columns = insert.columns.iter().map(|c| c.value.clone()).collect();
                let source = insert.source.as_ref().ok_or_else(|| FlowError::SqlNotSupported {
                    feature: "INSERT without VALUES".to_string(),
                    hint: "INSERT INTO ... VALUES (...) is required".to_string(),
                })?;
                let rows = match source.body.as_ref() {
                    SetExpr::Values(values) => values
                        .rows
                        .iter()
                        .map(|row| row.iter().map(|e| self.plan_expr(e)).collect())
                        .collect::<FlowResult<Vec<Vec<Expr>>>>()?,
                    _ => {
                        return Err(FlowError::SqlNotSupported {
                            feature: "INSERT with SELECT".to_string(),
                            hint: "Only INSERT INTO ... VALUES (...) is supported".to_string(),
                        });
                    }
                };
                Ok(StorePlan::Insert {
                    table,
                    columns,
                    rows,
                })
            }
            Statement::Update {
                table,
                assignments,
                selection,
                ..
            } => {
                let mut planned = Vec::with_capacity(assignments.len());
                for assignment in assignments {
                    let column = assignment.target.to_string();
                    planned.push((column, self.plan_expr(&assignment.value)?));
                }
                let filter = selection.as_ref().map(|e| self.plan_expr(e)).transpose()?;
                Ok(StorePlan::Update {
                    table: table.relation.to_string(),
                    assignments: planned,
                    filter,
                })
            }
            Statement::Delete(delete) => {
                let tables = match &delete.from {
                    FromTable::WithFromKeyword(t) => t,
                    FromTable::WithoutKeyword(t) => t,
                };
                let table = single_table(tables)?;
                let filter = delete
                    .selection
                    .as_ref()
                    .map(|e| self.plan_expr(e))
                    .transpose()?;
                Ok(StorePlan::Delete { table, filter })
            }
            Statement::CreateTable(create_table) => Ok(StorePlan::CreateTable {
                table: create_table.name.to_string(),
                columns: create_table
                    .columns
                    .iter()
                    .map(|col| col.name.value.clone())
                    .collect(),
                if_not_exists: create_table.if_not_exists,
            }),
            _ => Err(FlowError::SqlNotSupported {
                feature: format!("Statement type: {statement}"),
                hint: "Only SELECT, INSERT, UPDATE, DELETE and CREATE TABLE are supported"
                    .to_string(),
            }),
        }
    }

    fn plan_query(&self, query: &Query) -> FlowResult<StorePlan> {
        let select: &Select = match query.body.as_ref() {
            SetExpr::Select(select) => select.as_ref(),
            _ => {
                return Err(FlowError::SqlNotSupported {
                    feature: "Set operations".to_string(),
                    hint: "Only plain SELECT queries are supported".to_string(),
                });
            }
        };

        let table = single_table(&select.from)?;
        let projection = plan_projection(&select.projection)?;
        let filter = select
            .selection
            .as_ref()
            .map(|e| self.plan_expr(e))
            .transpose()?;

        // ORDER BY lives on Query, not Select
        let mut order_by = Vec::new();
        if let Some(ob) = &query.order_by {
            for item in &ob.exprs {
                let column = match &item.expr {
                    SqlExpr::Identifier(ident) => ident.value.clone(),
                    SqlExpr::CompoundIdentifier(idents) => {
                        idents.last().map(|i| i.value.clone()).unwrap_or_default()
                    }
                    other => {
                        return Err(FlowError::SqlNotSupported {
                            feature: format!("ORDER BY expression: {other}"),
                            hint: "Order by plain column names".to_string(),
                        });
                    }
                };
                order_by.push(SortKey {
                    column,
                    asc: item.asc.unwrap_or(true),
                });
            }
        }

        let limit = query.limit.as_ref().map(|e| self.plan_expr(e)).transpose()?;
        let offset = query
            .offset
            .as_ref()
            .map(|o| self.plan_expr(&o.value))
            .transpose()?;

        Ok(StorePlan::Select {
            table,
            projection,
            filter,
            order_by,
            limit,
            offset,
        })
    }

    fn plan_expr(&self, expr: &SqlExpr) -> FlowResult<Expr> {
        match expr {
            SqlExpr::Identifier(ident) => Ok(Expr::Column(ident.value.clone())),
            SqlExpr::CompoundIdentifier(idents) => Ok(Expr::Column(
                idents.last().map(|i| i.value.clone()).unwrap_or_default(),
            )),
            SqlExpr::Value(value) => self.plan_value(value),
            SqlExpr::UnaryOp {
                op: UnaryOperator::Minus,
                expr: inner,
            } => match self.plan_expr(inner)? {
                Expr::Literal(ScalarValue::Integer(v)) => Ok(Expr::Literal(ScalarValue::Integer(-v))),
                Expr::Literal(ScalarValue::Float(v)) => Ok(Expr::Literal(ScalarValue::Float(-v))),
                _ => Err(FlowError::SqlNotSupported {
                    feature: format!("Unary minus on {inner}"),
                    hint: "Negate numeric literals only".to_string(),
                }),
            },
            SqlExpr::BinaryOp { left, op, right } => {
                let left = self.plan_expr(left)?;
                let op = convert_binary_op(op)?;
                let right = self.plan_expr(right)?;
                Ok(Expr::BinaryOp {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                })
            }
            SqlExpr::IsNull(inner) => Ok(Expr::IsNull(Box::new(self.plan_expr(inner)?))),
            SqlExpr::IsNotNull(inner) => Ok(Expr::IsNotNull(Box::new(self.plan_expr(inner)?))),
            SqlExpr::Nested(inner) => self.plan_expr(inner),
            _ => Err(FlowError::SqlNotSupported {
                feature: format!("Expression: {expr}"),
                hint: "Use columns, literals, parameters, comparisons, AND/OR, IS [NOT] NULL"
                    .to_string(),
            }),
        }
    }

    fn plan_value(&self, value: &Value) -> FlowResult<Expr> {
        let scalar = match value {
            Value::Number(n, _) => {
                if let Ok(i) = n.parse::<i64>() {
                    ScalarValue::Integer(i)
                } else if let Ok(f) = n.parse::<f64>() {
                    ScalarValue::Float(f)
                } else {
                    return Err(FlowError::SqlParse {
                        message: format!("invalid number: {n}"),
                        sql: n.clone(),
                    });
                }
            }
            Value::SingleQuotedString(s) | Value::DoubleQuotedString(s) => {
                ScalarValue::Text(s.clone())
            }
            Value::Boolean(b) => ScalarValue::Integer(i64::from(*b)),
            Value::Null => ScalarValue::Null,
            Value::Placeholder(p) => return self.plan_placeholder(p),
            _ => {
                return Err(FlowError::SqlNotSupported {
                    feature: format!("Literal: {value}"),
                    hint: "Use numbers, quoted strings, NULL or parameters".to_string(),
                });
            }
        };
        Ok(Expr::Literal(scalar))
    }

    fn plan_placeholder(&self, placeholder: &str) -> FlowResult<Expr> {
        if placeholder == "?" {
            let idx = self.next_param.get();
            self.next_param.set(idx + 1);
            return Ok(Expr::Param(idx));
        }
        match placeholder
            .strip_prefix('$')
            .and_then(|n| n.parse::<usize>().ok())
        {
            Some(n) if n >= 1 => Ok(Expr::Param(n - 1)),
            _ => Err(FlowError::SqlNotSupported {
                feature: format!("Placeholder {placeholder}"),
                hint: "Use ? or $1, $2, ...".to_string(),
            }),
        }
    }
}

fn convert_binary_op(op: &SqlBinaryOp) -> FlowResult<BinaryOperator> {
    match op {
        SqlBinaryOp::Eq => Ok(BinaryOperator::Eq),
        SqlBinaryOp::NotEq => Ok(BinaryOperator::NotEq),
        SqlBinaryOp::Lt => Ok(BinaryOperator::Lt),
        SqlBinaryOp::LtEq => Ok(BinaryOperator::LtEq),
        SqlBinaryOp::Gt => Ok(BinaryOperator::Gt),
        SqlBinaryOp::GtEq => Ok(BinaryOperator::GtEq),
        SqlBinaryOp::And => Ok(BinaryOperator::And),
        SqlBinaryOp::Or => Ok(BinaryOperator::Or),
        _ => Err(FlowError::SqlNotSupported {
            feature: format!("Binary operator: {op}"),
            hint: "Supported: = <> < <= > >= AND OR".to_string(),
        }),
    }
}

fn single_table(from: &[TableWithJoins]) -> FlowResult<String> {
    match from {
        [only] if only.joins.is_empty() => match &only.relation {
            TableFactor::Table { name, .. } => Ok(name.to_string()),
            _ => Err(FlowError::SqlNotSupported {
                feature: "Complex table expressions".to_string(),
                hint: "Use simple table names only".to_string(),
            }),
        },
        [] => Err(FlowError::SqlParse {
            message: "FROM clause is required".to_string(),
            sql: String::new(),
        }),
        _ => Err(FlowError::SqlNotSupported {
            feature: "Multiple tables or JOIN".to_string(),
            hint: "Query one table per statement".to_string(),
        }),
    }
}

fn plan_projection(items: &[SelectItem]) -> FlowResult<Projection> {
    if let [SelectItem::Wildcard(_)] = items {
        return Ok(Projection::All);
    }
    let mut columns = Vec::with_capacity(items.len());
    for item in items {
        let (expr, alias) = match item {
            SelectItem::UnnamedExpr(expr) => (expr, None),
            SelectItem::ExprWithAlias { expr, alias } => (expr, Some(alias.value.clone())),
            _ => {
                return Err(FlowError::SqlNotSupported {
                    feature: format!("SELECT item: {item}"),
                    hint: "Select *, column names or COUNT(*)".to_string(),
                });
            }
        };
        match expr {
            SqlExpr::Identifier(ident) => columns.push(ident.value.clone()),
            SqlExpr::CompoundIdentifier(idents) => {
                columns.push(idents.last().map(|i| i.value.clone()).unwrap_or_default())
            }
            SqlExpr::Function(func) if is_count_star(func) && items.len() == 1 => {
                return Ok(Projection::Count(alias.unwrap_or_else(|| expr.to_string())));
            }
            _ => {
                return Err(FlowError::SqlNotSupported {
                    feature: format!("SELECT expression: {expr}"),
                    hint: "Select *, column names or COUNT(*)".to_string(),
                });
            }
        }
    }
    Ok(Projection::Columns(columns))
}

fn is_count_star(func: &sqlparser::ast::Function) -> bool {
    if !func.name.to_string().eq_ignore_ascii_case("count") {
        return false;
    }
    match &func.args {
        FunctionArguments::List(list) => matches!(
            list.args.as_slice(),
            [FunctionArg::Unnamed(FunctionArgExpr::Wildcard)]
        ),
        _ => false,
    }
}

// ─── Evaluation ───────────────────────────────────────

/// Resolves [`Expr`] against one row.
pub(crate) struct RowContext<'a> {
    pub table: &'a str,
    pub columns: &'a [String],
    pub row: &'a [ScalarValue],
    pub params: &'a [ScalarValue],
}

impl Expr {
    /// Evaluates without a row (VALUES, LIMIT, OFFSET).
    pub(crate) fn eval_const(&self, params: &[ScalarValue]) -> FlowResult<ScalarValue> {
        self.eval(&RowContext {
            table: "",
            columns: &[],
            row: &[],
            params,
        })
    }

    pub(crate) fn eval(&self, ctx: &RowContext<'_>) -> FlowResult<ScalarValue> {
        match self {
            Expr::Column(name) => {
                let idx = ctx.columns.iter().position(|c| c == name).ok_or_else(|| {
                    FlowError::ColumnNotFound {
                        table: ctx.table.to_string(),
                        column: name.clone(),
                    }
                })?;
                Ok(ctx.row[idx].clone())
            }
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Param(idx) => ctx.params.get(*idx).cloned().ok_or_else(|| {
                FlowError::InvalidArgument(format!(
                    "statement expects parameter #{} but {} were bound",
                    idx + 1,
                    ctx.params.len()
                ))
            }),
            Expr::IsNull(inner) => Ok(truth(inner.eval(ctx)?.is_null())),
            Expr::IsNotNull(inner) => Ok(truth(!inner.eval(ctx)?.is_null())),
            Expr::BinaryOp { left, op, right } => {
                let l = left.eval(ctx)?;
                let r = right.eval(ctx)?;
                Ok(apply_binary(&l, *op, &r))
            }
        }
    }

    /// WHERE 절 평가 (NULL은 false로 취급)
    pub(crate) fn matches(&self, ctx: &RowContext<'_>) -> FlowResult<bool> {
        Ok(is_true(&self.eval(ctx)?))
    }
}

fn truth(b: bool) -> ScalarValue {
    ScalarValue::Integer(i64::from(b))
}

fn is_true(v: &ScalarValue) -> bool {
    match v {
        ScalarValue::Integer(n) => *n != 0,
        ScalarValue::Float(f) => *f != 0.0,
        _ => false,
    }
}

fn apply_binary(l: &ScalarValue, op: BinaryOperator, r: &ScalarValue) -> ScalarValue {
    match op {
        BinaryOperator::And => match (l.is_null(), r.is_null()) {
            _ if (!l.is_null() && !is_true(l)) || (!r.is_null() && !is_true(r)) => truth(false),
            (false, false) => truth(true),
            _ => ScalarValue::Null,
        },
        BinaryOperator::Or => {
            if is_true(l) || is_true(r) {
                truth(true)
            } else if l.is_null() || r.is_null() {
                ScalarValue::Null
            } else {
                truth(false)
            }
        }
        cmp => match l.sql_cmp(r) {
            None => ScalarValue::Null,
            Some(ord) => truth(match cmp {
                BinaryOperator::Eq => ord == Ordering::Equal,
                BinaryOperator::NotEq => ord != Ordering::Equal,
                BinaryOperator::Lt => ord == Ordering::Less,
                BinaryOperator::LtEq => ord != Ordering::Greater,
                BinaryOperator::Gt => ord == Ordering::Greater,
                BinaryOperator::GtEq => ord != Ordering::Less,
                BinaryOperator::And | BinaryOperator::Or => unreachable!("handled above"),
            }),
        },
    }
}
