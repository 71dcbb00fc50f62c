//! Frame-level codec: one wire value per frame, in and out.
//!
//! Decoding is lenient at the frame level (anything that is not a single
//! well-formed `(method ...)` list yields `Ok(None)`) and strict at the
//! value level (malformed lists and strings are errors). Encoding is strict:
//! only numbers, booleans, and strings may appear as message arguments.

use crate::value::{format_number, write_quoted};
use crate::{Inbound, Message, Outbound, ProtocolError, Recipient, RequestId, Value, decode};

/// The handshake frame sent first on every new connection.
pub const HELLO: &str = "(hello)";

/// Decodes one frame into a [`Message`].
///
/// The single value must span the whole input: trailing bytes after it
/// invalidate the frame. Returns `Ok(None)` for empty input, trailing
/// input, a non-list value, an empty list, or a list whose head is not a
/// string.
///
/// # Errors
/// Propagates [`ProtocolError::MalformedList`] and
/// [`ProtocolError::MalformedString`] from the parser.
pub fn decode_message(text: &str) -> Result<Option<Message>, ProtocolError> {
    let Some(decoded) = decode(text, 0)? else {
        return Ok(None);
    };
    if decoded.range.end != text.len() {
        return Ok(None);
    }
    let Value::List(items) = decoded.value else {
        return Ok(None);
    };
    let mut items = items.into_iter();
    let Some(Value::Str(method)) = items.next() else {
        return Ok(None);
    };
    Ok(Some(Message {
        method,
        args: items.collect(),
    }))
}

/// Decodes and classifies one inbound frame.
pub fn decode_inbound(text: &str) -> Result<Option<Inbound>, ProtocolError> {
    Ok(decode_message(text)?.map(Inbound::from))
}

/// Renders an outbound frame.
///
/// # Errors
/// - [`ProtocolError::InvalidSymbol`]: channel name is not a bare token
/// - [`ProtocolError::InvalidArgumentType`]: an argument is not a finite
///   number, a boolean, or a string
pub fn encode(frame: &Outbound) -> Result<String, ProtocolError> {
    match frame {
        Outbound::Hello => Ok(HELLO.to_string()),
        Outbound::Notify {
            channel,
            recipient,
            args,
        } => {
            check_symbol(channel)?;
            let mut out = String::from("(notify ");
            out.push_str(channel);
            match recipient {
                Recipient::All => out.push_str(" *"),
                Recipient::Member(id) => {
                    out.push(' ');
                    write_quoted(&mut out, id);
                }
            }
            encode_args(&mut out, args)?;
            out.push(')');
            Ok(out)
        }
        Outbound::Request {
            id,
            issued_at,
            body,
        } => Ok(encode_request(*id, *issued_at, body)),
    }
}

/// Wraps an already rendered body as `(request "req-N" issued-at body)`.
///
/// `issued_at` is wall-clock seconds since the Unix epoch.
pub fn encode_request(id: RequestId, issued_at: f64, body: &str) -> String {
    let mut out = String::from("(request ");
    write_quoted(&mut out, &id.to_string());
    out.push(' ');
    out.push_str(&format_number(issued_at));
    out.push(' ');
    out.push_str(body);
    out.push(')');
    out
}

/// Renders `method arg...`, the body carried inside a request frame.
///
/// # Errors
/// Same as [`encode`], applied to `method` and `args`.
pub fn encode_request_body(method: &str, args: &[Value]) -> Result<String, ProtocolError> {
    check_symbol(method)?;
    let mut out = method.to_string();
    encode_args(&mut out, args)?;
    Ok(out)
}

/// Appends ` arg` for each argument.
fn encode_args(out: &mut String, args: &[Value]) -> Result<(), ProtocolError> {
    for (index, arg) in args.iter().enumerate() {
        out.push(' ');
        match arg {
            Value::Number(n) if n.is_finite() => out.push_str(&format_number(*n)),
            Value::Bool(true) => out.push_str("true"),
            Value::Bool(false) => out.push_str("false"),
            Value::Str(s) => write_quoted(out, s),
            other => {
                return Err(ProtocolError::InvalidArgumentType {
                    index,
                    kind: if matches!(other, Value::Number(_)) {
                        "non-finite number"
                    } else {
                        other.kind()
                    },
                });
            }
        }
    }
    Ok(())
}

/// Method and channel names go on the wire unquoted.
fn check_symbol(name: &str) -> Result<(), ProtocolError> {
    let bad = name.is_empty()
        || name
            .bytes()
            .any(|b| matches!(b, b' ' | b'\t' | b'\n' | b'\r' | b'(' | b')' | b'"'));
    if bad {
        return Err(ProtocolError::InvalidSymbol(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // =====================================================================
    // decode_message()
    // =====================================================================

    #[test]
    fn test_decode_message_splits_method_and_args() {
        let msg = decode_message("(a (1 2 3) 1 2 3)").unwrap().unwrap();
        assert_eq!(msg.method, "a");
        assert_eq!(msg.args.len(), 4);
        assert_eq!(msg.args[3], Value::from(3));
    }

    #[test]
    fn test_decode_message_trailing_input_is_rejected() {
        assert_eq!(decode_message("(keep-alive) x"), Ok(None));
        assert_eq!(decode_message("(keep-alive)(keep-alive)"), Ok(None));
    }

    #[test]
    fn test_decode_message_empty_and_non_list_are_none() {
        assert_eq!(decode_message(""), Ok(None));
        assert_eq!(decode_message("hello"), Ok(None));
        assert_eq!(decode_message("()"), Ok(None));
        assert_eq!(decode_message("(1 2)"), Ok(None));
    }

    #[test]
    fn test_decode_message_malformed_is_error() {
        assert!(matches!(
            decode_message("(on-notify \"x"),
            Err(ProtocolError::MalformedString { .. })
        ));
        assert!(matches!(
            decode_message("(on-notify x"),
            Err(ProtocolError::MalformedList { .. })
        ));
    }

    #[test]
    fn test_decode_inbound_classifies() {
        let inbound = decode_inbound(r#"(did-request "req-3" (1 2))"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            inbound,
            Inbound::DidRequest {
                request_id: Value::from("req-3"),
                result: Value::List(vec![Value::from(1), Value::from(2)]),
            }
        );
    }

    // =====================================================================
    // encode()
    // =====================================================================

    #[test]
    fn test_encode_hello() {
        assert_eq!(encode(&Outbound::Hello).unwrap(), "(hello)");
    }

    #[test]
    fn test_encode_notify_all_uses_star() {
        let frame = Outbound::Notify {
            channel: "chat".to_string(),
            recipient: Recipient::All,
            args: vec![Value::from("hi"), Value::from(2), Value::Bool(true)],
        };
        assert_eq!(encode(&frame).unwrap(), r#"(notify chat * "hi" 2 true)"#);
    }

    #[test]
    fn test_encode_notify_member_is_quoted() {
        let frame = Outbound::Notify {
            channel: "chat".to_string(),
            recipient: Recipient::Member("c-9".to_string()),
            args: vec![],
        };
        assert_eq!(encode(&frame).unwrap(), r#"(notify chat "c-9")"#);
    }

    #[test]
    fn test_encode_request_wraps_body() {
        let frame = Outbound::Request {
            id: RequestId(1),
            issued_at: 1700000000.5,
            body: r#"space "find-user" "u1""#.to_string(),
        };
        assert_eq!(
            encode(&frame).unwrap(),
            r#"(request "req-1" 1700000000.5 space "find-user" "u1")"#
        );
    }

    #[test]
    fn test_encode_request_body_escapes_strings() {
        let body =
            encode_request_body("space-do", &[Value::from("a\"b\n"), Value::from(-1.5)]).unwrap();
        assert_eq!(body, r#"space-do "a\"b\n" -1.5"#);
    }

    #[test]
    fn test_encode_rejects_list_argument() {
        let err = encode_request_body(
            "space",
            &[Value::from("ok"), Value::List(vec![Value::from(1)])],
        )
        .unwrap_err();
        assert_eq!(
            err,
            ProtocolError::InvalidArgumentType {
                index: 1,
                kind: "list"
            }
        );
    }

    #[test]
    fn test_encode_rejects_undefined_and_nan() {
        assert!(matches!(
            encode_request_body("m", &[Value::Undefined]),
            Err(ProtocolError::InvalidArgumentType { index: 0, kind: "undefined" })
        ));
        assert!(matches!(
            encode_request_body("m", &[Value::from(f64::NAN)]),
            Err(ProtocolError::InvalidArgumentType { index: 0, .. })
        ));
    }

    #[test]
    fn test_encode_rejects_bad_symbol() {
        assert_eq!(
            encode_request_body("two words", &[]),
            Err(ProtocolError::InvalidSymbol("two words".to_string()))
        );
        let frame = Outbound::Notify {
            channel: String::new(),
            recipient: Recipient::All,
            args: vec![],
        };
        assert!(matches!(encode(&frame), Err(ProtocolError::InvalidSymbol(_))));
    }

    #[test]
    fn test_encoded_arguments_decode_back() {
        let args = vec![
            Value::from("tab\there"),
            Value::from(42),
            Value::from(0.25),
            Value::Bool(false),
            Value::from("undefined"),
        ];
        let body = encode_request_body("echo", &args).unwrap();
        let msg = decode_message(&format!("({body})")).unwrap().unwrap();
        assert_eq!(msg.method, "echo");
        assert_eq!(msg.args, args);
    }
}
