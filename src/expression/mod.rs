use crate::error::{VellumError, VellumResult};
use crate::storage::tuple::Tuple;
use crate::utils::scalar::ScalarValue;
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

/// Minimal expression tree the executors evaluate against a tuple: column
/// references by position, literals, and binary comparisons/connectives.
#[derive(Debug, Clone)]
pub enum Expr {
    Column(ColumnExpr),
    Literal(Literal),
    Binary(BinaryExpr),
}

#[derive(Debug, Clone)]
pub struct ColumnExpr {
    pub index: usize,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct Literal {
    pub value: ScalarValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

#[derive(Debug, Clone)]
pub struct BinaryExpr {
    pub op: BinaryOp,
    pub left: Box<Expr>,
    pub right: Box<Expr>,
}

impl Expr {
    pub fn column(index: usize, name: impl Into<String>) -> Self {
        Expr::Column(ColumnExpr {
            index,
            name: name.into(),
        })
    }

    pub fn literal(value: impl Into<ScalarValue>) -> Self {
        Expr::Literal(Literal {
            value: value.into(),
        })
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary(BinaryExpr {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn evaluate(&self, tuple: &Tuple) -> VellumResult<ScalarValue> {
        match self {
            Expr::Column(column) => Ok(tuple.value(column.index)?.clone()),
            Expr::Literal(literal) => Ok(literal.value.clone()),
            Expr::Binary(binary) => binary.evaluate(tuple),
        }
    }
}

impl BinaryExpr {
    fn evaluate(&self, tuple: &Tuple) -> VellumResult<ScalarValue> {
        let left = self.left.evaluate(tuple)?;
        let right = self.right.evaluate(tuple)?;

        match self.op {
            BinaryOp::And | BinaryOp::Or => {
                let (ScalarValue::Boolean(l), ScalarValue::Boolean(r)) = (&left, &right) else {
                    return Err(VellumError::Execution(format!(
                        "logical operator applied to non-boolean operands {} and {}",
                        left, right
                    )));
                };
                let result = match (self.op, l, r) {
                    (BinaryOp::And, Some(l), Some(r)) => Some(*l && *r),
                    (BinaryOp::Or, Some(l), Some(r)) => Some(*l || *r),
                    _ => None,
                };
                Ok(ScalarValue::Boolean(result))
            }
            _ => {
                if left.is_null() || right.is_null() {
                    return Ok(ScalarValue::Boolean(None));
                }
                let Some(ordering) = left.partial_cmp(&right) else {
                    return Err(VellumError::Execution(format!(
                        "cannot compare {} with {}",
                        left, right
                    )));
                };
                let result = match self.op {
                    BinaryOp::Eq => ordering == Ordering::Equal,
                    BinaryOp::NotEq => ordering != Ordering::Equal,
                    BinaryOp::Lt => ordering == Ordering::Less,
                    BinaryOp::LtEq => ordering != Ordering::Greater,
                    BinaryOp::Gt => ordering == Ordering::Greater,
                    BinaryOp::GtEq => ordering != Ordering::Less,
                    BinaryOp::And | BinaryOp::Or => unreachable!(),
                };
                Ok(ScalarValue::Boolean(Some(result)))
            }
        }
    }
}

/// One ORDER BY term; earlier terms dominate.
#[derive(Debug, Clone)]
pub struct OrderByExpr {
    pub expr: Expr,
    pub asc: bool,
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Column(column) => write!(f, "{}", column.name),
            Expr::Literal(literal) => write!(f, "{}", literal.value),
            Expr::Binary(binary) => {
                let op = match binary.op {
                    BinaryOp::Eq => "=",
                    BinaryOp::NotEq => "!=",
                    BinaryOp::Lt => "<",
                    BinaryOp::LtEq => "<=",
                    BinaryOp::Gt => ">",
                    BinaryOp::GtEq => ">=",
                    BinaryOp::And => "AND",
                    BinaryOp::Or => "OR",
                };
                write!(f, "{} {} {}", binary.left, op, binary.right)
            }
        }
    }
}
