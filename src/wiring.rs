//! Type compatibility and the value rewrites used when an export is wired
//! into, or unwired from, an argument.

/// Separator between alternatives in a type tag, e.g. `string or secret`.
const ALTERNATIVE: &str = " or ";
const CONCAT_OPEN: &str = "concat(";

/// Reduces a type tag to the form used for comparison: the first alternative
/// only, with the `secret` type treated as `string`. Names that merely contain
/// `secret`, like `secret_map`, are left alone.
pub fn normalize_type(type_tag: &str) -> String {
    let head = type_tag.split(ALTERNATIVE).next().unwrap_or(type_tag).trim();
    let mut out = String::with_capacity(head.len());
    let mut word = String::new();
    for c in head.chars() {
        if c.is_alphanumeric() || c == '_' {
            word.push(c);
            continue;
        }
        push_type_word(&mut out, &word);
        word.clear();
        out.push(c);
    }
    push_type_word(&mut out, &word);
    out
}

fn push_type_word(out: &mut String, word: &str) {
    out.push_str(if word == "secret" { "string" } else { word });
}

pub fn is_list_type(type_tag: &str) -> bool {
    let t = normalize_type(type_tag);
    t == "list" || t == "array" || t.starts_with("list(") || t.starts_with("array(") || t.starts_with('[')
}

pub fn types_compatible(export_type: &str, argument_type: &str) -> bool {
    let a = normalize_type(export_type);
    let b = normalize_type(argument_type);
    a == b || a == "any" || b == "any"
}

/// Shape of an argument value as far as merging is concerned.
#[derive(Debug, PartialEq, Eq)]
pub enum ValueForm<'a> {
    Empty,
    /// `[a, b]`, with its top-level elements.
    List(Vec<&'a str>),
    /// `concat(a, b)`, with its top-level arguments.
    Concat(Vec<&'a str>),
    /// A bare reference or any other single expression.
    Single(&'a str),
}

impl<'a> ValueForm<'a> {
    pub fn of(value: &'a str) -> Self {
        let v = value.trim();
        if v.is_empty() {
            return ValueForm::Empty;
        }
        if let Some(inner) = enclosed(v, CONCAT_OPEN, ")") {
            return ValueForm::Concat(split_top_level(inner));
        }
        if let Some(inner) = enclosed(v, "[", "]") {
            return ValueForm::List(split_top_level(inner));
        }
        ValueForm::Single(v)
    }
}

/// Returns `inner` when `value` is exactly `open inner close` with the opener
/// matched by the final closer.
fn enclosed<'a>(value: &'a str, open: &str, close: &str) -> Option<&'a str> {
    let inner = value.strip_prefix(open)?.strip_suffix(close)?;
    // `[a] + [b]` starts and ends with brackets but is not one list.
    let reopened = format!("{}{inner}", &open[open.len() - 1..]);
    if depth_never_closes(&reopened) {
        Some(inner)
    } else {
        None
    }
}

fn depth_never_closes(text: &str) -> bool {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    for c in text.chars() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '`' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => {
                depth -= 1;
                if depth == 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    true
}

/// Splits on commas that are not nested inside brackets, braces, parentheses
/// or quotes. Empty pieces (e.g. a trailing comma) are dropped.
pub fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '`' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(text[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(text[start..].trim());
    parts.retain(|p| !p.is_empty());
    parts
}

fn render_concat(args: &[&str]) -> String {
    format!("{CONCAT_OPEN}{})", args.join(", "))
}

fn render_list(items: &[&str]) -> String {
    format!("[{}]", items.join(", "))
}

/// Computes the new value of a target argument after wiring `reference`
/// (an `instance.export` string) into it. Returns `None` when the connection
/// must be rejected: incompatible types on a scalar argument.
pub fn merge_reference(
    current: &str,
    reference: &str,
    export_type: &str,
    argument_type: &str,
) -> Option<String> {
    let list_target = is_list_type(argument_type);
    let compatible = types_compatible(export_type, argument_type);

    match (compatible, list_target) {
        (true, false) => Some(reference.to_string()),
        (false, false) => None,
        (true, true) => Some(match ValueForm::of(current) {
            ValueForm::Empty => reference.to_string(),
            ValueForm::List(items) if items.is_empty() => reference.to_string(),
            ValueForm::Concat(mut args) => {
                args.push(reference);
                render_concat(&args)
            }
            ValueForm::List(_) | ValueForm::Single(_) => render_concat(&[current.trim(), reference]),
        }),
        // Element-typed export into a list argument: build list syntax.
        (false, true) => {
            let wrapped = format!("[{reference}]");
            Some(match ValueForm::of(current) {
                ValueForm::Empty => wrapped,
                ValueForm::List(items) if items.is_empty() => wrapped,
                ValueForm::List(mut items) => {
                    items.push(reference);
                    render_list(&items)
                }
                ValueForm::Concat(mut args) => {
                    args.push(&wrapped);
                    render_concat(&args)
                }
                ValueForm::Single(existing) => render_concat(&[existing, &wrapped]),
            })
        }
    }
}

/// Removes one `reference` from a value built by [`merge_reference`] (or
/// written by hand in the same shapes). Values that do not mention the
/// reference in a recognisable position are returned unchanged.
pub fn remove_reference(value: &str, reference: &str) -> String {
    match ValueForm::of(value) {
        ValueForm::Empty => String::new(),
        ValueForm::Single(v) if v == reference => String::new(),
        ValueForm::Single(v) => v.to_string(),
        ValueForm::List(items) => {
            let kept: Vec<&str> = items.into_iter().filter(|i| *i != reference).collect();
            if kept.is_empty() {
                String::new()
            } else {
                render_list(&kept)
            }
        }
        ValueForm::Concat(args) => {
            let kept: Vec<String> = args
                .into_iter()
                .map(|a| remove_reference(a, reference))
                .filter(|a| !a.is_empty())
                .collect();
            match kept.len() {
                0 => String::new(),
                1 => kept[0].clone(),
                _ => {
                    let refs: Vec<&str> = kept.iter().map(String::as_str).collect();
                    render_concat(&refs)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_type() {
        assert_eq!(normalize_type("string or secret"), "string");
        assert_eq!(normalize_type("secret"), "string");
        assert_eq!(normalize_type("list(secret)"), "list(string)");
        assert_eq!(normalize_type(" number "), "number");
        assert_eq!(normalize_type("map(secret)"), "map(string)");
    }

    #[test]
    fn test_normalize_type_keeps_names_containing_secret() {
        assert_eq!(normalize_type("secret_map"), "secret_map");
        assert_eq!(normalize_type("list(secrets)"), "list(secrets)");
        assert!(!types_compatible("secret_map", "string_map"));
        assert!(types_compatible("secret_map", "secret_map"));
    }

    #[test]
    fn test_compatibility() {
        assert!(types_compatible("string", "secret"));
        assert!(types_compatible("secret", "string or secret"));
        assert!(types_compatible("list(map(string))", "list(map(string))"));
        assert!(!types_compatible("number", "string"));
        assert!(!types_compatible("string", "list(string)"));
        assert!(types_compatible("any", "number"));
    }

    #[test]
    fn test_list_types() {
        assert!(is_list_type("list(string)"));
        assert!(is_list_type("array(number)"));
        assert!(!is_list_type("string"));
        assert!(!is_list_type("map(list(string))"));
    }

    #[test]
    fn test_value_forms() {
        assert_eq!(ValueForm::of("  "), ValueForm::Empty);
        assert_eq!(ValueForm::of("[a, [b, c], \"d,e\"]"), ValueForm::List(vec!["a", "[b, c]", "\"d,e\""]));
        assert_eq!(ValueForm::of("concat(a, f(b, c))"), ValueForm::Concat(vec!["a", "f(b, c)"]));
        assert_eq!(ValueForm::of("[a] + [b]"), ValueForm::Single("[a] + [b]"));
        assert_eq!(ValueForm::of("concat(a) + concat(b)"), ValueForm::Single("concat(a) + concat(b)"));
        assert_eq!(ValueForm::of("[]"), ValueForm::List(vec![]));
    }

    #[test]
    fn test_scalar_merge_is_last_write_wins() {
        assert_eq!(merge_reference("old.value", "a.out", "string", "string").as_deref(), Some("a.out"));
        assert_eq!(merge_reference("", "a.out", "secret", "string or secret").as_deref(), Some("a.out"));
    }

    #[test]
    fn test_scalar_mismatch_is_rejected() {
        assert_eq!(merge_reference("\"x\"", "a.count", "number", "string"), None);
    }

    #[test]
    fn test_compatible_list_merge_builds_concat() {
        let t = "list(map(string))";
        let first = merge_reference("", "a.targets", t, t).unwrap();
        assert_eq!(first, "a.targets");
        let second = merge_reference(&first, "b.targets", t, t).unwrap();
        assert_eq!(second, "concat(a.targets, b.targets)");
        let third = merge_reference(&second, "c.targets", t, t).unwrap();
        assert_eq!(third, "concat(a.targets, b.targets, c.targets)");
    }

    #[test]
    fn test_list_merge_over_empty_list_literal() {
        let t = "list(map(string))";
        assert_eq!(merge_reference("[]", "a.targets", t, t).as_deref(), Some("a.targets"));
        assert_eq!(merge_reference(" [ ] ", "a.targets", t, t).as_deref(), Some("a.targets"));
        assert_eq!(merge_reference("[]", "a.out", "string", "list(string)").as_deref(), Some("[a.out]"));
    }

    #[test]
    fn test_element_into_list_uses_list_syntax() {
        let first = merge_reference("", "a.out", "string", "list(string)").unwrap();
        assert_eq!(first, "[a.out]");
        let second = merge_reference(&first, "b.out2", "string", "list(string)").unwrap();
        assert_eq!(second, "[a.out, b.out2]");
    }

    #[test]
    fn test_element_into_list_over_existing_reference() {
        let merged = merge_reference("x.targets", "b.out", "string", "list(string)").unwrap();
        assert_eq!(merged, "concat(x.targets, [b.out])");
        let merged = merge_reference(&merged, "c.out", "string", "list(string)").unwrap();
        assert_eq!(merged, "concat(x.targets, [b.out], [c.out])");
    }

    #[test]
    fn test_remove_reference() {
        assert_eq!(remove_reference("a.out", "a.out"), "");
        assert_eq!(remove_reference("[a.out, b.out2]", "a.out"), "[b.out2]");
        assert_eq!(remove_reference("[a.out]", "a.out"), "");
        assert_eq!(remove_reference("concat(a.t, b.t)", "a.t"), "b.t");
        assert_eq!(remove_reference("concat(a.t, b.t, c.t)", "b.t"), "concat(a.t, c.t)");
        assert_eq!(remove_reference("concat(x.t, [b.out])", "b.out"), "x.t");
        assert_eq!(remove_reference("\"static\"", "a.out"), "\"static\"");
    }
}
