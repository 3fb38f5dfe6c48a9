//! `{name}` placeholder interpolation.
//!
//! `{{` and `}}` produce literal braces. Every other `{...}` must name a
//! binding known to the lookup function.

use crate::error::{Error, Result};

/// Expands `{name}` placeholders in `template` using `lookup`.
pub fn interpolate<F>(template: &str, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut output = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                output.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                output.push('}');
            }
            '{' => {
                let mut key = String::new();
                let mut closed = false;
                for next in chars.by_ref() {
                    if next == '}' {
                        closed = true;
                        break;
                    }
                    key.push(next);
                }
                if !closed {
                    return Err(Error::Template {
                        template: template.to_string(),
                        message: "unterminated placeholder".to_string(),
                    });
                }
                match lookup(key.trim()) {
                    Some(value) => output.push_str(&value),
                    None => {
                        return Err(Error::Template {
                            template: template.to_string(),
                            message: format!("unknown placeholder '{{{}}}'", key),
                        })
                    }
                }
            }
            '}' => {
                return Err(Error::Template {
                    template: template.to_string(),
                    message: "unmatched '}'".to_string(),
                })
            }
            other => output.push(other),
        }
    }

    Ok(output)
}

/// True when `text` contains at least one placeholder.
pub fn has_placeholders(text: &str) -> bool {
    text.replace("{{", "").replace("}}", "").contains('{')
}
