//! INI-like key-file codec.
//!
//! ```text
//! # Description of the group
//! [network]
//! # Description of the key
//! host=example.org
//! port=8080
//! ```
//!
//! Groups and keys keep their file order. Comment lines (`#` or `;`)
//! directly above a group header or key line become its description; a
//! blank line breaks that association. Values are trimmed and support the
//! escapes `\n`, `\t`, `\r`, `\\` and a leading `\s`.

use std::path::Path;

use crate::error::{ConfiError, Result};


#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    pub value: String,
    pub comment: String,
}


#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub name: String,
    pub comment: String,
    pub entries: Vec<Entry>,
}

impl Group {
    fn new(name: &str) -> Self {
        Group {
            name: name.to_string(),
            comment: String::new(),
            entries: Vec::new(),
        }
    }

    pub fn entry(&self, key: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.key == key)
    }

    fn entry_mut(&mut self, key: &str) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|e| e.key == key)
    }
}


/// In-memory key-file document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyFile {
    groups: Vec<Group>,
}

impl KeyFile {
    pub fn new() -> Self {
        KeyFile { groups: Vec::new() }
    }

    /// Read and parse a key-file from disk.
    pub fn load(path: &Path) -> Result<KeyFile> {
        let content = std::fs::read_to_string(path)?;
        KeyFile::parse(&content)
    }

    /// Write the whole document, replacing the target atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file_name = path
            .file_name()
            .ok_or_else(|| ConfiError::malformed(format!("not a file path: {}", path.display())))?;
        let mut tmp_name = file_name.to_os_string();
        tmp_name.push(".tmp");
        let tmp = path.with_file_name(tmp_name);

        std::fs::write(&tmp, self.to_text())?;
        if let Err(e) = std::fs::rename(&tmp, path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    pub fn parse(content: &str) -> Result<KeyFile> {
        let mut doc = KeyFile::new();
        let mut pending: Vec<String> = Vec::new();
        let mut current: Option<usize> = None;

        for (idx, raw_line) in content.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw_line.trim();

            if line.is_empty() {
                pending.clear();
                continue;
            }

            if let Some(text) = line.strip_prefix('#').or_else(|| line.strip_prefix(';')) {
                pending.push(text.strip_prefix(' ').unwrap_or(text).to_string());
                continue;
            }

            if line.starts_with('[') {
                let name = line
                    .strip_prefix('[')
                    .and_then(|l| l.strip_suffix(']'))
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .ok_or_else(|| {
                        ConfiError::malformed(format!("line {}: invalid group header", line_no))
                    })?;
                let pos = doc.group_index_or_insert(name);
                if !pending.is_empty() {
                    doc.groups[pos].comment = pending.join("\n");
                }
                pending.clear();
                current = Some(pos);
                continue;
            }

            let pos = current.ok_or_else(|| {
                ConfiError::malformed(format!("line {}: key outside of any group", line_no))
            })?;
            let (key, value) = line.split_once('=').ok_or_else(|| {
                ConfiError::malformed(format!("line {}: expected key=value", line_no))
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(ConfiError::malformed(format!("line {}: empty key", line_no)));
            }

            let value = unescape(value.trim());
            let comment = pending.join("\n");
            pending.clear();

            let group = &mut doc.groups[pos];
            match group.entry_mut(key) {
                Some(existing) => {
                    existing.value = value;
                    if !comment.is_empty() {
                        existing.comment = comment;
                    }
                }
                None => group.entries.push(Entry {
                    key: key.to_string(),
                    value,
                    comment,
                }),
            }
        }

        Ok(doc)
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for (i, group) in self.groups.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            write_comment(&mut out, &group.comment);
            out.push_str(&format!("[{}]\n", group.name));
            for entry in &group.entries {
                write_comment(&mut out, &entry.comment);
                out.push_str(&format!("{}={}\n", entry.key, escape(&entry.value)));
            }
        }
        out
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.name == name)
    }

    pub fn entry(&self, group: &str, key: &str) -> Option<&Entry> {
        self.group(group).and_then(|g| g.entry(key))
    }

    pub fn value(&self, group: &str, key: &str) -> Option<&str> {
        self.entry(group, key).map(|e| e.value.as_str())
    }

    /// Ensure a group exists; returns true when it had to be created.
    pub fn add_group(&mut self, name: &str) -> bool {
        let before = self.groups.len();
        self.group_index_or_insert(name);
        self.groups.len() > before
    }

    /// Set a value, creating the group and key when missing.
    pub fn set_value(&mut self, group: &str, key: &str, value: &str) {
        let pos = self.group_index_or_insert(group);
        let g = &mut self.groups[pos];
        match g.entry_mut(key) {
            Some(entry) => entry.value = value.to_string(),
            None => g.entries.push(Entry {
                key: key.to_string(),
                value: value.to_string(),
                comment: String::new(),
            }),
        }
    }

    /// Replace the comment of an existing key. False when absent.
    pub fn set_comment(&mut self, group: &str, key: &str, comment: &str) -> bool {
        match self.entry_mut(group, key) {
            Some(entry) => {
                entry.comment = comment.to_string();
                true
            }
            None => false,
        }
    }

    pub fn remove_key(&mut self, group: &str, key: &str) -> bool {
        match self.groups.iter_mut().find(|g| g.name == group) {
            Some(g) => {
                let before = g.entries.len();
                g.entries.retain(|e| e.key != key);
                g.entries.len() < before
            }
            None => false,
        }
    }

    pub fn remove_group(&mut self, name: &str) -> bool {
        let before = self.groups.len();
        self.groups.retain(|g| g.name != name);
        self.groups.len() < before
    }

    fn entry_mut(&mut self, group: &str, key: &str) -> Option<&mut Entry> {
        self.groups
            .iter_mut()
            .find(|g| g.name == group)
            .and_then(|g| g.entry_mut(key))
    }

    fn group_index_or_insert(&mut self, name: &str) -> usize {
        match self.groups.iter().position(|g| g.name == name) {
            Some(pos) => pos,
            None => {
                self.groups.push(Group::new(name));
                self.groups.len() - 1
            }
        }
    }
}


/// Check that `name` survives a write/parse cycle as a key name.
pub fn check_key_name(name: &str) -> Result<()> {
    check_name("key", name)?;
    if name.contains('=') {
        return Err(ConfiError::malformed(format!("key name '{}' contains '='", name)));
    }
    Ok(())
}


/// Check that `name` survives a write/parse cycle as a group name.
pub fn check_group_name(name: &str) -> Result<()> {
    check_name("group", name)
}


fn check_name(kind: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() || name.trim() != name {
        return Err(ConfiError::malformed(format!(
            "{} name '{}' is blank or padded",
            kind, name
        )));
    }
    if name.starts_with(|c: char| matches!(c, '[' | '#' | ';')) {
        return Err(ConfiError::malformed(format!(
            "{} name '{}' starts with a reserved character",
            kind, name
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(ConfiError::malformed(format!(
            "{} name contains a control character",
            kind
        )));
    }
    Ok(())
}


fn write_comment(out: &mut String, comment: &str) {
    if comment.is_empty() {
        return;
    }
    for line in comment.lines() {
        if line.is_empty() {
            out.push_str("#\n");
        } else {
            out.push_str(&format!("# {}\n", line));
        }
    }
}


fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for (i, c) in value.chars().enumerate() {
        match c {
            ' ' if i == 0 => out.push_str("\\s"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    // Trailing whitespace would be trimmed on parse.
    if out.ends_with(' ') {
        out.pop();
        out.push_str("\\s");
    }
    out
}


fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('s') => out.push(' '),
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
