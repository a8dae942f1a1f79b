//! Stage command templates
//!
//! Templates use `{name}` placeholders. Unknown names are left untouched,
//! so shell syntax such as `${HOME}` passes through.

/// Values substituted into stage command templates
#[derive(Debug, Clone, Default)]
pub struct CommandContext<'a> {
    pub source_dir: &'a str,
    pub build_dir: &'a str,
    pub jobs: u32,
    pub flags: &'a str,
    pub test_filter: Option<&'a str>,
    pub uid: u32,
    pub gid: u32,
}

impl CommandContext<'_> {
    fn lookup(&self, key: &str) -> Option<String> {
        match key {
            "source_dir" => Some(self.source_dir.to_string()),
            "build_dir" => Some(self.build_dir.to_string()),
            "jobs" => Some(self.jobs.to_string()),
            "flags" => Some(self.flags.to_string()),
            "test_filter" => Some(
                self.test_filter
                    .map(|filter| shell_quote(&format!("--gtest_filter={filter}")))
                    .unwrap_or_default(),
            ),
            "uid" => Some(self.uid.to_string()),
            "gid" => Some(self.gid.to_string()),
            _ => None,
        }
    }
}

/// Substitute placeholders in a single pass.
///
/// Substituted values are never rescanned, so flags containing braces are
/// inserted verbatim.
pub fn render(template: &str, ctx: &CommandContext<'_>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        match after.find('}') {
            Some(close) if is_placeholder(&after[..close]) => {
                let key = &after[..close];
                match ctx.lookup(key) {
                    Some(value) => out.push_str(&value),
                    None => {
                        out.push('{');
                        out.push_str(key);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out.trim_end().to_string()
}

fn is_placeholder(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|c| c.is_ascii_lowercase() || c == '_')
}

/// Quote a value for `sh`/`bash` using single quotes
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Wrap a rendered command for execution by `shell -c`
pub fn shell_command(shell: &str, command: &str) -> Vec<String> {
    vec![shell.to_string(), "-c".to_string(), command.to_string()]
}
