//! Dialect formatting (§4.5): a dialect is the Cartesian product of the
//! command axis (`cmd`/`tok`) and the prefix axis (textual/numeric). The
//! engine builds one [`bytes::Bytes`] per distinct dialect actually needed
//! by a fanout call and reuses it across every recipient sharing that
//! dialect.

use bytes::Bytes;

use crate::entity::EntityId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandForm {
    /// Long textual command, e.g. `PRIVMSG`. Sent to local clients.
    Textual,
    /// One- or two-letter token, e.g. `P`. Server-to-server links only.
    Token,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrefixForm {
    /// Nick or server name.
    Name,
    /// Numnick (user) or 2-char numeric (server).
    Numeric,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dialect {
    pub command: CommandForm,
    pub prefix: PrefixForm,
}

impl Dialect {
    pub const CLIENT: Dialect = Dialect {
        command: CommandForm::Textual,
        prefix: PrefixForm::Name,
    };
    pub const SERVER: Dialect = Dialect {
        command: CommandForm::Token,
        prefix: PrefixForm::Numeric,
    };

    fn slot(self) -> usize {
        let cmd = matches!(self.command, CommandForm::Token) as usize;
        let pfx = matches!(self.prefix, PrefixForm::Numeric) as usize;
        cmd * 2 + pfx
    }
}

/// Typed replacement for the C varargs + `%C` formatter (§9 "Variadic format
/// functions"). `Arg::Client`/`Arg::Channel` are resolved per-dialect (numnick
/// vs display name) only when a dialect's buffer is actually rendered.
#[derive(Debug, Clone)]
pub enum Arg {
    Str(String),
    Int(i64),
    Client(EntityId, String),
    Channel(String),
}

impl Arg {
    fn render(&self, dialect: Dialect) -> String {
        match self {
            Arg::Str(s) => s.clone(),
            Arg::Int(i) => i.to_string(),
            Arg::Channel(name) => name.clone(),
            Arg::Client(id, display_name) => match dialect.prefix {
                PrefixForm::Numeric => id.to_string(),
                PrefixForm::Name => display_name.clone(),
            },
        }
    }
}

/// Lives on the call frame of a single fanout call and is dropped when that
/// call returns (§4.5 "Rust realization"); `[Option<Bytes>; 4]` keyed by
/// [`Dialect::slot`].
#[derive(Default)]
pub struct DialectCache {
    slots: [Option<Bytes>; 4],
}

impl DialectCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached buffer for `dialect`, building it via `build` on
    /// first need and guaranteeing the 512-byte-including-CRLF bound (P4).
    pub fn get_or_build(
        &mut self,
        dialect: Dialect,
        verb_textual: &str,
        verb_token: &str,
        prefix: Option<&str>,
        args: &[Arg],
    ) -> Bytes {
        let slot = dialect.slot();
        if let Some(existing) = &self.slots[slot] {
            return existing.clone();
        }
        let built = format_line(dialect, verb_textual, verb_token, prefix, args);
        self.slots[slot] = Some(built.clone());
        built
    }
}

/// Renders one line for `dialect`, guaranteeing the output (including CRLF)
/// never exceeds 512 bytes (P4); truncation is silent at the boundary.
pub fn format_line(
    dialect: Dialect,
    verb_textual: &str,
    verb_token: &str,
    prefix: Option<&str>,
    args: &[Arg],
) -> Bytes {
    let verb = match dialect.command {
        CommandForm::Textual => verb_textual,
        CommandForm::Token => verb_token,
    };

    let mut line = String::with_capacity(128);
    if let Some(p) = prefix {
        line.push(':');
        line.push_str(p);
        line.push(' ');
    }
    line.push_str(verb);

    for (i, arg) in args.iter().enumerate() {
        line.push(' ');
        let rendered = arg.render(dialect);
        if i + 1 == args.len() && (rendered.contains(' ') || rendered.is_empty()) {
            line.push(':');
        }
        line.push_str(&rendered);
    }

    terminate(line)
}

/// Enforces the 512-byte-including-CRLF bound (P4) on an already-assembled
/// line and appends the terminator. Shared by [`format_line`] and
/// `send::send_reply`, which builds numeric replies without going through
/// the `Arg`-based last-param heuristic.
pub fn terminate(mut line: String) -> Bytes {
    const MAX_WITH_CRLF: usize = 512;
    let budget = MAX_WITH_CRLF - 2;
    if line.len() > budget {
        // Truncate on a char boundary, never mid-UTF-8-sequence.
        let mut cut = budget;
        while !line.is_char_boundary(cut) {
            cut -= 1;
        }
        line.truncate(cut);
    }
    line.push_str("\r\n");
    Bytes::from(line.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_textual_and_token_forms() {
        let args = [Arg::Channel("#ops".to_string()), Arg::Str("hi there".to_string())];
        let client_line = format_line(Dialect::CLIENT, "PRIVMSG", "P", Some("alice"), &args);
        assert!(client_line.starts_with(b":alice PRIVMSG #ops :hi there"));

        let server_line = format_line(Dialect::SERVER, "PRIVMSG", "P", Some("AAAAA"), &args);
        assert!(server_line.starts_with(b":AAAAA P #ops :hi there"));
    }

    #[test]
    fn never_exceeds_512_bytes_and_ends_with_crlf() {
        let long_text = "x".repeat(1000);
        let args = [Arg::Str(long_text)];
        let line = format_line(Dialect::CLIENT, "NOTICE", "O", Some("server.example"), &args);
        assert!(line.len() <= 512);
        assert!(line.ends_with(b"\r\n"));
    }

    #[test]
    fn cache_reuses_buffer_for_same_dialect() {
        let mut cache = DialectCache::new();
        let args = [Arg::Str("hi".to_string())];
        let a = cache.get_or_build(Dialect::CLIENT, "NOTICE", "O", Some("x"), &args);
        let b = cache.get_or_build(Dialect::CLIENT, "NOTICE", "O", Some("x"), &args);
        assert_eq!(a, b);
        assert!(std::ptr::eq(a.as_ptr(), b.as_ptr()));
    }

    #[test]
    fn client_arg_renders_per_dialect() {
        let id = EntityId::User("AAAAA".to_string());
        let args = [Arg::Client(id, "alice".to_string())];
        let client_line = format_line(Dialect::CLIENT, "WHOIS", "W", None, &args);
        assert!(client_line.starts_with(b"WHOIS alice"));
        let server_line = format_line(Dialect::SERVER, "WHOIS", "W", None, &args);
        assert!(server_line.starts_with(b"W AAAAA"));
    }
}
