//! Template helper functions.
//!
//! Values follow script-host semantics rather than minijinja's own: empty
//! lists and maps are truthy, arithmetic coerces strings to numbers, and
//! equality never coerces.

use minijinja::value::{Rest, Value, ValueKind};
use minijinja::{escape_formatter, Environment, Error, Output, State};

/// Largest integer an f64 represents exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Register every helper on a template environment.
///
/// `and`, `or` and `not` are operators in the template syntax, so the logical
/// helpers carry a trailing underscore.
pub fn register_helpers(env: &mut Environment<'_>) {
    env.add_function("default", default);
    env.add_function("concat", concat);
    env.add_function("dynamicPartial", dynamic_partial);
    env.add_function("eq", eq);
    env.add_function("ne", ne);
    env.add_function("and_", and);
    env.add_function("or_", or);
    env.add_function("not_", not);
    env.add_function("gte", gte);
    env.add_function("lte", lte);
    env.add_function("plus", plus);
    env.add_function("minus", minus);
    env.add_function("divide", divide);
    env.add_function("multiply", multiply);
    env.add_function("abs", abs);
    env.add_function("mod", modulo);
    env.set_formatter(format_value);
}

/// Output formatter: booleans print as `true` and `false`.
fn format_value(out: &mut Output, state: &State, value: &Value) -> Result<(), Error> {
    if value.kind() == ValueKind::Bool {
        escape_formatter(out, state, &Value::from(bool_display(value)))
    } else {
        escape_formatter(out, state, value)
    }
}

fn bool_display(value: &Value) -> &'static str {
    if value.is_true() {
        "true"
    } else {
        "false"
    }
}

/// Truthiness: `false`, `0`, `NaN`, `""`, none and undefined are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value.kind() {
        ValueKind::Undefined | ValueKind::None => false,
        ValueKind::Bool => value.is_true(),
        ValueKind::Number => {
            let n = to_number(value);
            n != 0.0 && !n.is_nan()
        }
        ValueKind::String => value.as_str().is_some_and(|s| !s.is_empty()),
        _ => true,
    }
}

/// Numeric coercion, the unary `+` of the script host.
pub fn to_number(value: &Value) -> f64 {
    match value.kind() {
        ValueKind::Undefined => f64::NAN,
        ValueKind::None => 0.0,
        ValueKind::Bool => {
            if value.is_true() {
                1.0
            } else {
                0.0
            }
        }
        ValueKind::Number => f64::try_from(value.clone()).unwrap_or(f64::NAN),
        ValueKind::String => value.as_str().map(parse_numeric).unwrap_or(f64::NAN),
        ValueKind::Seq => match value.len() {
            Some(0) => 0.0,
            Some(1) => value
                .get_item_by_index(0)
                .map(|item| to_number(&item))
                .unwrap_or(f64::NAN),
            _ => f64::NAN,
        },
        _ => f64::NAN,
    }
}

/// Parse a numeric string literal. Anything unparseable is `NaN`.
fn parse_numeric(s: &str) -> f64 {
    let s = s.trim();
    if s.is_empty() {
        return 0.0;
    }

    match s {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }

    for (prefix, radix) in [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)] {
        if let Some(digits) = s.strip_prefix(prefix) {
            if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
                return f64::NAN;
            }
            return u64::from_str_radix(digits, radix)
                .map(|n| n as f64)
                .unwrap_or(f64::NAN);
        }
    }

    // Rust's float parser also accepts "inf" and "nan", which are not numbers here.
    let literal = s
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'));
    if literal {
        s.parse().unwrap_or(f64::NAN)
    } else {
        f64::NAN
    }
}

/// Wrap an arithmetic result, keeping integral results integral.
fn number(n: f64) -> Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        Value::from(n as i64)
    } else {
        Value::from(n)
    }
}

/// String form used when joining values.
fn to_display(value: &Value) -> String {
    match value.kind() {
        ValueKind::Undefined | ValueKind::None => String::new(),
        ValueKind::Bool => bool_display(value).to_string(),
        ValueKind::Number => {
            let n = to_number(value);
            if n.is_nan() {
                "NaN".to_string()
            } else if n == f64::INFINITY {
                "Infinity".to_string()
            } else if n == f64::NEG_INFINITY {
                "-Infinity".to_string()
            } else {
                number(n).to_string()
            }
        }
        ValueKind::Seq => value
            .try_iter()
            .map(|items| items.map(|item| to_display(&item)).collect::<Vec<_>>().join(","))
            .unwrap_or_default(),
        _ => value.to_string(),
    }
}

/// Equality without coercion. Lists and maps are references in the script
/// host, so two of them are never equal.
fn strict_eq(a: &Value, b: &Value) -> bool {
    match (a.kind(), b.kind()) {
        (ValueKind::Number, ValueKind::Number) => to_number(a) == to_number(b),
        (ValueKind::Seq | ValueKind::Map | ValueKind::Iterable | ValueKind::Plain, _) => false,
        (ka, kb) if ka == kb => a == b,
        _ => false,
    }
}

/// `{{ default(description, "fallback copy") }}`
pub fn default(values: Rest<Value>) -> Value {
    values
        .iter()
        .find(|value| is_truthy(value))
        .or_else(|| values.last())
        .cloned()
        .unwrap_or(Value::UNDEFINED)
}

/// `{{ concat(first, " ", last) }}`
pub fn concat(values: Rest<Value>) -> String {
    values.iter().map(to_display).collect()
}

/// `{% include dynamicPartial(name) %}`
pub fn dynamic_partial(name: Value) -> Value {
    name
}

pub fn eq(a: Value, b: Value) -> bool {
    strict_eq(&a, &b)
}

pub fn ne(a: Value, b: Value) -> bool {
    !strict_eq(&a, &b)
}

pub fn and(a: Value, b: Value) -> Value {
    if is_truthy(&a) {
        b
    } else {
        a
    }
}

pub fn or(a: Value, b: Value) -> Value {
    if is_truthy(&a) {
        a
    } else {
        b
    }
}

pub fn not(a: Value) -> bool {
    !is_truthy(&a)
}

pub fn gte(a: Value, b: Value) -> bool {
    to_number(&a) >= to_number(&b)
}

pub fn lte(a: Value, b: Value) -> bool {
    to_number(&a) <= to_number(&b)
}

pub fn plus(a: Value, b: Value) -> Value {
    number(to_number(&a) + to_number(&b))
}

pub fn minus(a: Value, b: Value) -> Value {
    number(to_number(&a) - to_number(&b))
}

pub fn divide(a: Value, b: Value) -> Value {
    number(to_number(&a) / to_number(&b))
}

pub fn multiply(a: Value, b: Value) -> Value {
    number(to_number(&a) * to_number(&b))
}

pub fn abs(a: Value) -> Value {
    number(to_number(&a).abs())
}

/// Remainder with the sign of the dividend.
pub fn modulo(a: Value, b: Value) -> Value {
    number(to_number(&a) % to_number(&b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use minijinja::context;
    use pretty_assertions::assert_eq;

    fn render(source: &str) -> String {
        let mut env = Environment::new();
        register_helpers(&mut env);
        env.render_str(source, context! { items => Vec::<i32>::new(), zero => 0 })
            .unwrap()
    }

    fn rest(values: Vec<Value>) -> Rest<Value> {
        Rest(values)
    }

    #[test]
    fn default_skips_falsy_values() {
        let picked = default(rest(vec![
            Value::UNDEFINED,
            Value::from(0),
            Value::from("x"),
        ]));
        assert_eq!(picked, Value::from("x"));

        let picked = default(rest(vec![Value::from(""), Value::from(false)]));
        assert_eq!(picked, Value::from(false));

        assert!(default(rest(vec![])).is_undefined());
    }

    #[test]
    fn default_treats_empty_list_as_present() {
        assert_eq!(render("{{ default(none, items) }}"), "[]");
    }

    #[test]
    fn concat_joins_string_forms() {
        assert_eq!(render(r#"{{ concat("a", 1, none, "b", 2.5) }}"#), "a1b2.5");
        assert_eq!(render(r#"{{ concat("n=", plus(1, 1)) }}"#), "n=2");
    }

    #[test]
    fn dynamic_partial_returns_name() {
        assert_eq!(dynamic_partial(Value::from("card")), Value::from("card"));
    }

    #[test]
    fn equality_is_strict() {
        assert!(!eq(Value::from(1), Value::from("1")));
        assert!(eq(Value::from(1), Value::from(1.0)));
        assert!(eq(Value::from("a"), Value::from("a")));
        assert!(!eq(Value::from(f64::NAN), Value::from(f64::NAN)));
        assert!(!eq(Value::UNDEFINED, Value::from(())));
        assert!(ne(Value::from(0), Value::from(false)));
    }

    #[test]
    fn containers_are_never_equal() {
        assert!(!eq(Value::from(vec![1]), Value::from(vec![1])));
        assert!(ne(Value::from(Vec::<i32>::new()), Value::from(Vec::<i32>::new())));
        assert_eq!(render("{{ eq([1], [1]) }}"), "false");
        assert_eq!(render("{{ eq(items, items) }}"), "false");
    }

    #[test]
    fn logical_helpers_return_operands() {
        assert_eq!(and(Value::from(1), Value::from("b")), Value::from("b"));
        assert_eq!(and(Value::from(""), Value::from("b")), Value::from(""));
        assert_eq!(or(Value::from(0), Value::from("b")), Value::from("b"));
        assert_eq!(or(Value::from("a"), Value::from("b")), Value::from("a"));
        assert!(not(Value::from(0)));
        assert!(!not(Value::from(Vec::<Value>::new())));
    }

    #[test]
    fn comparisons_coerce_operands() {
        assert!(gte(Value::from("10"), Value::from(9)));
        assert!(lte(Value::from(" 3 "), Value::from("3")));
        assert!(!gte(Value::from("abc"), Value::from(0)));
        assert!(!lte(Value::UNDEFINED, Value::from(0)));
    }

    #[test]
    fn arithmetic_coerces_operands() {
        assert_eq!(plus(Value::from("2"), Value::from(3)), Value::from(5));
        assert_eq!(minus(Value::from("0x10"), Value::from(true)), Value::from(15));
        assert_eq!(multiply(Value::from("1.5"), Value::from(2)), Value::from(3));
        assert_eq!(divide(Value::from(1), Value::from(4)), Value::from(0.25));
        assert_eq!(modulo(Value::from(-7), Value::from(3)), Value::from(-1));
        assert_eq!(plus(Value::from(()), Value::from("")), Value::from(0));
    }

    #[test]
    fn arithmetic_with_non_numeric_input_is_nan() {
        assert!(to_number(&plus(Value::from("abc"), Value::from(1))).is_nan());
        assert!(to_number(&plus(Value::UNDEFINED, Value::from(1))).is_nan());
        assert!(to_number(&modulo(Value::from(1), Value::from(0))).is_nan());
        assert!(to_number(&Value::from("inf")).is_nan());
        assert_eq!(to_number(&Value::from("-Infinity")), f64::NEG_INFINITY);
    }

    #[test]
    fn abs_is_never_negative() {
        assert_eq!(abs(Value::from(-4)), Value::from(4));
        assert_eq!(abs(Value::from("-2.5")), Value::from(2.5));
        assert_eq!(abs(Value::from(0)), Value::from(0));
    }

    #[test]
    fn helpers_render_in_templates() {
        assert_eq!(render(r#"{{ plus("2", 3) }}"#), "5");
        assert_eq!(render(r#"{{ eq(1, "1") }}"#), "false");
        assert_eq!(render(r#"{{ default(missing, zero, "x") }}"#), "x");
        assert_eq!(render("{% if not_(zero) %}empty{% endif %}"), "empty");
        assert_eq!(render("{{ or_(zero, 7) }}"), "7");
    }

    #[test]
    fn booleans_render_lowercase() {
        assert_eq!(render(r#"{{ eq(1, "1") }}"#), "false");
        assert_eq!(render("{{ eq(1, 1) }}"), "true");
        assert_eq!(render("{{ concat(true, 1) }}"), "true1");
        assert_eq!(render("{{ concat(false) }}"), "false");
        assert_eq!(render("{{ lte(none, 0) }}"), "true");
        assert_eq!(render("{{ not_(zero) }}"), "true");
    }
}
