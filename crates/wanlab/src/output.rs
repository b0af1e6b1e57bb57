//! Rendering for `--output`.
//!
//! Session commands print through a [`Printer`] built from the global
//! flags. Tables come from `tabled` row structs, structured formats
//! serialize the core types as they are, and plain mode prints one port
//! key (or outcome line) per line for scripts.

use std::io::{self, IsTerminal, Write};

use serde::Serialize;
use tabled::{Table, Tabled, settings::Style};

use crate::cli::{ColorMode, GlobalOpts, OutputFormat};

/// stdout/stderr writer bound to the selected format and `--quiet`.
pub struct Printer {
    format: OutputFormat,
    quiet: bool,
}

impl Printer {
    pub fn new(global: &GlobalOpts) -> Self {
        Self {
            format: global.output.clone(),
            quiet: global.quiet,
        }
    }

    pub fn format(&self) -> &OutputFormat {
        &self.format
    }

    /// Rows as a table, items through serde, or `key` per line.
    pub fn list<T, R>(&self, items: &[T], row: impl Fn(&T) -> R, key: impl Fn(&T) -> String)
    where
        T: Serialize,
        R: Tabled,
    {
        self.emit(&self.render_list(items, row, key));
    }

    /// `detail` text in table mode, the item through serde, or its `key`.
    pub fn item<T>(&self, item: &T, detail: impl Fn(&T) -> String, key: impl Fn(&T) -> String)
    where
        T: Serialize + ?Sized,
    {
        self.emit(&self.render_item(item, detail, key));
    }

    /// A one-line result such as "Applied 4 port(s)". Structured formats
    /// get the underlying value instead of the sentence.
    pub fn outcome<T: Serialize + ?Sized>(&self, value: &T, message: &str) {
        self.emit(&self.render_item(value, |_| message.to_owned(), |_| message.to_owned()));
    }

    /// Progress or confirmation on stderr, so stdout stays parseable.
    pub fn note(&self, message: &str) {
        if !self.quiet {
            eprintln!("{message}");
        }
    }

    fn render_list<T, R>(
        &self,
        items: &[T],
        row: impl Fn(&T) -> R,
        key: impl Fn(&T) -> String,
    ) -> String
    where
        T: Serialize,
        R: Tabled,
    {
        match self.format {
            OutputFormat::Table => table(&items.iter().map(row).collect::<Vec<_>>()),
            OutputFormat::Plain => items.iter().map(key).collect::<Vec<_>>().join("\n"),
            _ => structured(&self.format, items),
        }
    }

    fn render_item<T>(
        &self,
        item: &T,
        detail: impl Fn(&T) -> String,
        key: impl Fn(&T) -> String,
    ) -> String
    where
        T: Serialize + ?Sized,
    {
        match self.format {
            OutputFormat::Table => detail(item),
            OutputFormat::Plain => key(item),
            _ => structured(&self.format, item),
        }
    }

    fn emit(&self, text: &str) {
        if self.quiet || text.is_empty() {
            return;
        }
        let _ = writeln!(io::stdout().lock(), "{text}");
    }
}

fn structured<T: Serialize + ?Sized>(format: &OutputFormat, data: &T) -> String {
    match format {
        OutputFormat::Yaml => yaml(data),
        OutputFormat::JsonCompact => json_line(data),
        _ => json_pretty(data),
    }
}

pub fn table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

pub fn json_pretty<T: Serialize + ?Sized>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|e| format!("serialization failed: {e}"))
}

pub fn json_line<T: Serialize + ?Sized>(data: &T) -> String {
    serde_json::to_string(data).unwrap_or_else(|e| format!("serialization failed: {e}"))
}

pub fn yaml<T: Serialize + ?Sized>(data: &T) -> String {
    serde_yaml::to_string(data).unwrap_or_else(|e| format!("serialization failed: {e}"))
}

/// Color on stdout: forced by `--color`, else a terminal without `NO_COLOR`.
pub fn color_enabled(mode: &ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none(),
    }
}

// ── Counter cells ────────────────────────────────────────────────────

/// Link counters with decimal suffixes: `950`, `12.3k`, `4.56M`, `1.20G`.
#[allow(clippy::cast_precision_loss, clippy::as_conversions)]
pub fn count(n: u64) -> String {
    let f = n as f64;
    if f >= 1e9 {
        format!("{:.2}G", f / 1e9)
    } else if f >= 1e6 {
        format!("{:.2}M", f / 1e6)
    } else if f >= 1e3 {
        format!("{:.1}k", f / 1e3)
    } else {
        n.to_string()
    }
}

/// Unset shaping fields show as `-`.
pub fn dash<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".into(), |v| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Link {
        key: &'static str,
        delay_ms: u32,
    }

    #[derive(Tabled)]
    struct LinkRow {
        #[tabled(rename = "Key")]
        key: String,
    }

    fn printer(format: OutputFormat) -> Printer {
        Printer {
            format,
            quiet: false,
        }
    }

    fn links() -> Vec<Link> {
        vec![
            Link {
                key: "client1:eth0",
                delay_ms: 50,
            },
            Link {
                key: "lab_server:eth0",
                delay_ms: 0,
            },
        ]
    }

    fn row(l: &Link) -> LinkRow {
        LinkRow { key: l.key.into() }
    }

    #[test]
    fn plain_list_prints_keys() {
        let text = printer(OutputFormat::Plain).render_list(&links(), row, |l| l.key.into());
        assert_eq!(text, "client1:eth0\nlab_server:eth0");
    }

    #[test]
    fn table_list_uses_row_headers() {
        let text = printer(OutputFormat::Table).render_list(&links(), row, |l| l.key.into());
        assert!(text.contains("Key"));
        assert!(text.contains("lab_server:eth0"));
    }

    #[test]
    fn compact_json_is_one_line() {
        let text = printer(OutputFormat::JsonCompact).render_list(&links(), row, |l| l.key.into());
        assert_eq!(
            text,
            r#"[{"key":"client1:eth0","delay_ms":50},{"key":"lab_server:eth0","delay_ms":0}]"#
        );
    }

    #[test]
    fn outcome_sentence_only_outside_structured_formats() {
        let value = serde_json::json!({ "applied": 4 });
        let p = printer(OutputFormat::Table);
        assert_eq!(p.render_item(&value, |_| "Applied 4".into(), |_| "x".into()), "Applied 4");
        let p = printer(OutputFormat::Yaml);
        assert_eq!(p.render_item(&value, |_| "Applied 4".into(), |_| "x".into()), "applied: 4\n");
    }

    #[test]
    fn counters_use_decimal_suffixes() {
        assert_eq!(count(0), "0");
        assert_eq!(count(999), "999");
        assert_eq!(count(1_000), "1.0k");
        assert_eq!(count(12_345), "12.3k");
        assert_eq!(count(4_560_000), "4.56M");
        assert_eq!(count(1_200_000_000), "1.20G");
    }

    #[test]
    fn dash_for_unset_fields() {
        assert_eq!(dash::<u32>(None), "-");
        assert_eq!(dash(Some(40)), "40");
    }
}
