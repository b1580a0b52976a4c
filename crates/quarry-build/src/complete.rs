//! Shell autocompletion over the command path namespace.
//!
//! Completion requests arrive through the standard bash completion contract:
//! `COMP_LINE` and `COMP_POINT` describe the command line being completed,
//! `COMP_TYPE` selects between completing in place (`9`, tab) and listing
//! candidates (`63`).

use std::collections::BTreeMap;

/// Extract the path prefix being completed from the completion environment.
///
/// Returns `None` when the environment does not describe a completion
/// request.
pub fn prefix(exe_name: &str, comp_line: &str, comp_point: &str) -> Option<String> {
    if comp_line.is_empty() || comp_point.is_empty() {
        return None;
    }
    let point: usize = comp_point.parse().ok()?;
    let upto = comp_line
        .get(..point.min(comp_line.len()))
        .unwrap_or(comp_line);
    let trimmed = upto.trim_start_matches(|c| exe_name.contains(c));
    let start = trimmed.rfind(' ').map(|idx| idx + 1).unwrap_or(0);
    Some(trimmed[start..].to_string())
}

/// Candidate path segments for `prefix`, mapped to whether the candidate has
/// children (the match was cut at a `/`). When the same segment appears both
/// as a leaf and as an interior node, interior wins.
pub fn choices_for_prefix<'p>(
    paths: impl IntoIterator<Item = &'p str>,
    prefix: &str,
) -> BTreeMap<String, bool> {
    let start = prefix.rfind('/').map(|idx| idx + 1).unwrap_or(0);
    let mut choices = BTreeMap::new();
    for path in paths {
        if !path.starts_with(prefix) {
            continue;
        }
        let mut choice = &path[start..];
        let mut children = false;
        if let Some(end) = choice.find('/') {
            choice = &choice[..end];
            children = true;
        }
        let entry = choices.entry(choice.to_string()).or_insert(children);
        if children {
            *entry = true;
        }
    }
    choices
}

/// Longest common prefix of all candidate segments.
pub fn longest_prefix(choices: &BTreeMap<String, bool>) -> String {
    let mut keys = choices.keys();
    let Some(first) = keys.next() else {
        return String::new();
    };
    let mut common = first.as_bytes();
    for choice in keys {
        let bytes = choice.as_bytes();
        let mut idx = 0;
        while idx < common.len() && idx < bytes.len() && common[idx] == bytes[idx] {
            idx += 1;
        }
        common = &common[..idx];
    }
    String::from_utf8_lossy(common).into_owned()
}

/// Produce the lines to print for one completion request.
pub fn complete<'p>(
    paths: impl IntoIterator<Item = &'p str>,
    prefix: &str,
    comp_type: &str,
) -> Vec<String> {
    let choices = choices_for_prefix(paths, prefix);
    match comp_type {
        "9" => {
            let start = prefix.rfind('/').map(|idx| idx + 1).unwrap_or(0);
            let parent = &prefix[..start];
            if choices.len() == 1 {
                let (choice, children) = choices.iter().next().expect("one choice");
                let suffix = if *children { "/" } else { " " };
                vec![format!("{parent}{choice}{suffix}")]
            } else {
                let common = longest_prefix(&choices);
                if common.is_empty() {
                    Vec::new()
                } else {
                    vec![format!("{parent}{common}")]
                }
            }
        }
        "63" => {
            if choices.len() > 1 {
                choices
                    .iter()
                    .map(|(choice, children)| {
                        if *children {
                            format!("{choice}/")
                        } else {
                            choice.clone()
                        }
                    })
                    .collect()
            } else {
                Vec::new()
            }
        }
        _ => Vec::new(),
    }
}
