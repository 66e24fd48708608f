// The fixed predicate vocabulary of the expectation DSL. The registry is
// closed: names resolve to variants at load time and each variant declares
// the value kinds it applies to.

use serde_json::Value;

/// JSON value kinds used for predicate admission checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Null,
    Bool,
    Number,
    String,
    List,
    Object,
}

pub fn kind_of(value: &Value) -> Kind {
    match value {
        Value::Null => Kind::Null,
        Value::Bool(_) => Kind::Bool,
        Value::Number(_) => Kind::Number,
        Value::String(_) => Kind::String,
        Value::Array(_) => Kind::List,
        Value::Object(_) => Kind::Object,
    }
}

pub fn kind_name(value: &Value) -> &'static str {
    match kind_of(value) {
        Kind::Null => "null",
        Kind::Bool => "bool",
        Kind::Number => "number",
        Kind::String => "string",
        Kind::List => "list",
        Kind::Object => "object",
    }
}

const NUMERIC: &[Kind] = &[Kind::Number];
const LIST: &[Kind] = &[Kind::List];
const SCALAR: &[Kind] = &[Kind::Number, Kind::String, Kind::Bool];
const SCALAR_OR_OBJECT: &[Kind] = &[Kind::Number, Kind::String, Kind::Bool, Kind::Object];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predicate {
    Len,
    Gt,
    Gte,
    Lt,
    Lte,
    OneOf,
    Any,
    First,
    All,
    Store,
}

impl Predicate {
    pub const ALL: [Predicate; 10] = [
        Predicate::Len,
        Predicate::Gt,
        Predicate::Gte,
        Predicate::Lt,
        Predicate::Lte,
        Predicate::OneOf,
        Predicate::Any,
        Predicate::First,
        Predicate::All,
        Predicate::Store,
    ];

    pub fn lookup(name: &str) -> Option<Predicate> {
        match name {
            "len" => Some(Predicate::Len),
            "gt" => Some(Predicate::Gt),
            "gte" => Some(Predicate::Gte),
            "lt" => Some(Predicate::Lt),
            "lte" => Some(Predicate::Lte),
            "one_of" => Some(Predicate::OneOf),
            "any" => Some(Predicate::Any),
            "first" => Some(Predicate::First),
            "all" => Some(Predicate::All),
            "store" => Some(Predicate::Store),
            _ => None,
        }
    }

    pub fn is_predicate(name: &str) -> bool {
        Predicate::lookup(name).is_some()
    }

    pub fn name(self) -> &'static str {
        match self {
            Predicate::Len => "len",
            Predicate::Gt => "gt",
            Predicate::Gte => "gte",
            Predicate::Lt => "lt",
            Predicate::Lte => "lte",
            Predicate::OneOf => "one_of",
            Predicate::Any => "any",
            Predicate::First => "first",
            Predicate::All => "all",
            Predicate::Store => "store",
        }
    }

    /// Value kinds this predicate may be applied to.
    pub fn accepts(self) -> &'static [Kind] {
        match self {
            Predicate::Len | Predicate::Any | Predicate::First | Predicate::All => LIST,
            Predicate::Gt | Predicate::Gte | Predicate::Lt | Predicate::Lte => NUMERIC,
            Predicate::OneOf => SCALAR_OR_OBJECT,
            Predicate::Store => SCALAR,
        }
    }

    pub fn accepts_value(self, value: &Value) -> bool {
        self.accepts().contains(&kind_of(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lookup_roundtrip() {
        for predicate in Predicate::ALL {
            assert_eq!(Predicate::lookup(predicate.name()), Some(predicate));
        }
    }

    #[test]
    fn test_unknown_name() {
        assert_eq!(Predicate::lookup("matches"), None);
        assert!(!Predicate::is_predicate("regex"));
    }

    #[test]
    fn test_numeric_predicates_reject_lists() {
        assert!(Predicate::Gt.accepts_value(&json!(3)));
        assert!(!Predicate::Gt.accepts_value(&json!([1, 2])));
        assert!(!Predicate::Lte.accepts_value(&json!("7")));
    }

    #[test]
    fn test_list_predicates() {
        for predicate in [Predicate::Len, Predicate::Any, Predicate::First, Predicate::All] {
            assert!(predicate.accepts_value(&json!([])));
            assert!(!predicate.accepts_value(&json!({"a": 1})));
        }
    }

    #[test]
    fn test_one_of_accepts_scalars_and_objects() {
        assert!(Predicate::OneOf.accepts_value(&json!("x")));
        assert!(Predicate::OneOf.accepts_value(&json!(1.5)));
        assert!(Predicate::OneOf.accepts_value(&json!({"k": 1})));
        assert!(!Predicate::OneOf.accepts_value(&json!([1])));
    }

    #[test]
    fn test_store_accepts_scalars_only() {
        assert!(Predicate::Store.accepts_value(&json!("token")));
        assert!(Predicate::Store.accepts_value(&json!(42)));
        assert!(Predicate::Store.accepts_value(&json!(true)));
        assert!(!Predicate::Store.accepts_value(&json!([])));
        assert!(!Predicate::Store.accepts_value(&json!({})));
    }
}
