//! Lab-scoped `/etc/hosts` management.
//!
//! Entries are wrapped in begin/end marker lines so the destroy path can
//! strip exactly what the deploy added, and a re-deploy replaces the
//! previous block instead of duplicating it.

use std::io::Result;
use std::path::Path;

/// Default hosts file location.
pub const HOSTS_FILE: &str = "/etc/hosts";

fn start_marker(lab: &str) -> String {
    format!("###### CLAB-{}-START ######", lab)
}

fn end_marker(lab: &str) -> String {
    format!("###### CLAB-{}-END ######", lab)
}

/// Appends `name -> ip` entries for a lab, replacing any previous block.
pub fn append_entries(path: &Path, lab: &str, entries: &[(String, String)]) -> Result<()> {
    let mut content = strip_block(&read_or_empty(path)?, lab);

    if !entries.is_empty() {
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        content.push_str(&start_marker(lab));
        content.push('\n');
        for (name, ip) in entries {
            content.push_str(&format!("{} {}\n", ip, name));
        }
        content.push_str(&end_marker(lab));
        content.push('\n');
    }

    std::fs::write(path, content)
}

/// Removes the lab's block from the hosts file, if present.
pub fn remove_entries(path: &Path, lab: &str) -> Result<()> {
    let content = read_or_empty(path)?;
    let stripped = strip_block(&content, lab);
    if stripped != content {
        std::fs::write(path, stripped)?;
    }
    Ok(())
}

fn read_or_empty(path: &Path) -> Result<String> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(err) => Err(err),
    }
}

fn strip_block(content: &str, lab: &str) -> String {
    let start = start_marker(lab);
    let end = end_marker(lab);

    let mut result = String::with_capacity(content.len());
    let mut in_block = false;
    for line in content.lines() {
        if line == start {
            in_block = true;
            continue;
        }
        if line == end {
            in_block = false;
            continue;
        }
        if !in_block {
            result.push_str(line);
            result.push('\n');
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let hosts = dir.path().join("hosts");
        std::fs::write(&hosts, "127.0.0.1 localhost\n").unwrap();

        let entries = vec![
            ("clab-demo-r1".to_string(), "172.20.20.2".to_string()),
            ("clab-demo-r2".to_string(), "172.20.20.3".to_string()),
        ];
        append_entries(&hosts, "demo", &entries).unwrap();

        let content = std::fs::read_to_string(&hosts).unwrap();
        assert!(content.contains("127.0.0.1 localhost"));
        assert!(content.contains("172.20.20.2 clab-demo-r1"));
        assert!(content.contains("###### CLAB-demo-START ######"));

        remove_entries(&hosts, "demo").unwrap();
        let content = std::fs::read_to_string(&hosts).unwrap();
        assert_eq!(content, "127.0.0.1 localhost\n");
    }

    #[test]
    fn test_reappend_replaces_block() {
        let dir = tempfile::tempdir().unwrap();
        let hosts = dir.path().join("hosts");

        let first = vec![("clab-demo-r1".to_string(), "172.20.20.2".to_string())];
        append_entries(&hosts, "demo", &first).unwrap();
        let second = vec![("clab-demo-r1".to_string(), "172.20.20.9".to_string())];
        append_entries(&hosts, "demo", &second).unwrap();

        let content = std::fs::read_to_string(&hosts).unwrap();
        assert!(!content.contains("172.20.20.2"));
        assert!(content.contains("172.20.20.9"));
        assert_eq!(content.matches("CLAB-demo-START").count(), 1);
    }

    #[test]
    fn test_remove_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        remove_entries(&dir.path().join("hosts"), "demo").unwrap();
    }

    #[test]
    fn test_blocks_are_lab_scoped() {
        let dir = tempfile::tempdir().unwrap();
        let hosts = dir.path().join("hosts");

        append_entries(
            &hosts,
            "one",
            &[("clab-one-r1".to_string(), "10.0.0.1".to_string())],
        )
        .unwrap();
        append_entries(
            &hosts,
            "two",
            &[("clab-two-r1".to_string(), "10.0.0.2".to_string())],
        )
        .unwrap();

        remove_entries(&hosts, "one").unwrap();
        let content = std::fs::read_to_string(&hosts).unwrap();
        assert!(!content.contains("clab-one-r1"));
        assert!(content.contains("clab-two-r1"));
    }
}
