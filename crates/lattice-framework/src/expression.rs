//! Parser for `"service(arg1, arg2)"` middleware expressions.
//!
//! An expression names a service registered in the module's compiler chain
//! and the wants passed to it on every call. Grammar:
//!
//! ```text
//! expression := ident [ "(" [ ident { "," ident } ] ")" ]
//! ident      := [A-Za-z_][A-Za-z0-9_]*
//! ```
//!
//! `"limiter"`, `"limiter()"` and `"limiter(redis, clock)"` are all valid.
//! Parsing happens once, when the module is added to a tree.

/// A parsed expression: the target service name and its wants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression {
    pub service: String,
    pub wants: Vec<String>,
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parses an expression, returning a reason string on failure.
pub fn parse(raw: &str) -> Result<Expression, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("expression is empty".to_string());
    }

    let (service, args) = match raw.split_once('(') {
        None => (raw, None),
        Some((service, rest)) => {
            let Some(args) = rest.strip_suffix(')') else {
                return Err("missing closing parenthesis".to_string());
            };
            if args.contains('(') || args.contains(')') {
                return Err("nested parentheses are not allowed".to_string());
            }
            (service.trim_end(), Some(args))
        }
    };

    if !is_ident(service) {
        return Err(format!("'{service}' is not a valid service name"));
    }

    let mut wants = Vec::new();
    if let Some(args) = args {
        let args = args.trim();
        if !args.is_empty() {
            for arg in args.split(',') {
                let arg = arg.trim();
                if !is_ident(arg) {
                    return Err(format!("'{arg}' is not a valid argument name"));
                }
                wants.push(arg.to_string());
            }
        }
    }

    Ok(Expression {
        service: service.to_string(),
        wants,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_name_has_no_wants() {
        let expr = parse("limiter").unwrap();
        assert_eq!(expr.service, "limiter");
        assert!(expr.wants.is_empty());
    }

    #[test]
    fn empty_parens_are_allowed() {
        assert!(parse("limiter()").unwrap().wants.is_empty());
    }

    #[test]
    fn arguments_are_split_and_trimmed() {
        let expr = parse("limiter( redis , clock )").unwrap();
        assert_eq!(expr.wants, vec!["redis".to_string(), "clock".to_string()]);
    }

    #[test]
    fn malformed_expressions_are_rejected() {
        assert!(parse("").is_err());
        assert!(parse("limiter(").is_err());
        assert!(parse("limiter(a,)").is_err());
        assert!(parse("limiter(a)(b)").is_err());
        assert!(parse("9limiter").is_err());
        assert!(parse("limiter(1a)").is_err());
    }
}
