use crate::catalog::DataType;
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone)]
pub enum ScalarValue {
    Boolean(Option<bool>),
    Int32(Option<i32>),
    Int64(Option<i64>),
    Varchar(Option<String>),
}

impl ScalarValue {
    pub fn new_empty(data_type: DataType) -> Self {
        match data_type {
            DataType::Boolean => Self::Boolean(None),
            DataType::Int32 => Self::Int32(None),
            DataType::Int64 => Self::Int64(None),
            DataType::Varchar => Self::Varchar(None),
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            ScalarValue::Boolean(_) => DataType::Boolean,
            ScalarValue::Int32(_) => DataType::Int32,
            ScalarValue::Int64(_) => DataType::Int64,
            ScalarValue::Varchar(_) => DataType::Varchar,
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            ScalarValue::Boolean(v) => v.is_none(),
            ScalarValue::Int32(v) => v.is_none(),
            ScalarValue::Int64(v) => v.is_none(),
            ScalarValue::Varchar(v) => v.is_none(),
        }
    }

    fn as_i64(&self) -> Option<i64> {
        match self {
            ScalarValue::Int32(v) => v.map(|x| x as i64),
            ScalarValue::Int64(v) => *v,
            _ => None,
        }
    }
}

impl PartialEq for ScalarValue {
    fn eq(&self, other: &Self) -> bool {
        self.partial_cmp(other) == Some(Ordering::Equal)
    }
}

impl PartialOrd for ScalarValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        fn is_integer(v: &ScalarValue) -> bool {
            matches!(v, ScalarValue::Int32(_) | ScalarValue::Int64(_))
        }
        match (self, other) {
            (ScalarValue::Boolean(a), ScalarValue::Boolean(b)) => a.partial_cmp(b),
            (ScalarValue::Varchar(a), ScalarValue::Varchar(b)) => a.partial_cmp(b),
            // integers compare across widths
            (a, b) if is_integer(a) && is_integer(b) => a.as_i64().partial_cmp(&b.as_i64()),
            _ => None,
        }
    }
}

impl Display for ScalarValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ScalarValue::Boolean(Some(v)) => write!(f, "{}", v),
            ScalarValue::Int32(Some(v)) => write!(f, "{}", v),
            ScalarValue::Int64(Some(v)) => write!(f, "{}", v),
            ScalarValue::Varchar(Some(v)) => write!(f, "{}", v),
            _ => write!(f, "NULL"),
        }
    }
}

impl From<bool> for ScalarValue {
    fn from(value: bool) -> Self {
        ScalarValue::Boolean(Some(value))
    }
}

impl From<i32> for ScalarValue {
    fn from(value: i32) -> Self {
        ScalarValue::Int32(Some(value))
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        ScalarValue::Int64(Some(value))
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        ScalarValue::Varchar(Some(value.to_string()))
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        ScalarValue::Varchar(Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compare_across_integer_widths() {
        let a: ScalarValue = 1i32.into();
        let b: ScalarValue = 2i64.into();
        assert_eq!(a.partial_cmp(&b), Some(Ordering::Less));
        assert_eq!(b.partial_cmp(&a), Some(Ordering::Greater));
    }

    #[test]
    fn null_sorts_before_values() {
        let null = ScalarValue::Int32(None);
        let one: ScalarValue = 1i32.into();
        assert_eq!(null.partial_cmp(&one), Some(Ordering::Less));
    }

    #[test]
    fn incomparable_types() {
        let a: ScalarValue = true.into();
        let b: ScalarValue = "x".into();
        assert_eq!(a.partial_cmp(&b), None);
    }
}
