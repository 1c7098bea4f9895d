//! Line diffs between an original and a rewritten text region.
//!
//! Uses Myers' O(ND) algorithm to find a shortest edit script and then
//! groups it into opcodes (`equal`, `delete`, `insert`, `replace`) over line
//! index ranges, the same decomposition a sequence matcher produces.

use serde::Serialize;

/// Kind of a diff opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OpTag {
    Equal,
    Delete,
    Insert,
    Replace,
}

/// One opcode: `old[i1..i2]` becomes `new[j1..j2]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opcode {
    pub tag: OpTag,
    pub i1: usize,
    pub i2: usize,
    pub j1: usize,
    pub j2: usize,
}

/// A single line-range replacement, ready to be applied to a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineEdit {
    pub action: OpTag,
    /// First line replaced (0-based).
    pub start: usize,
    /// One past the last line replaced; equals `start` for inserts.
    pub end: usize,
    /// Replacement text, `None` for deletions.
    pub text: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Equal,
    Delete,
    Insert,
}

/// Compute the shortest edit script from `old` to `new`.
fn myers<T: PartialEq>(old: &[T], new: &[T]) -> Vec<Step> {
    let n = old.len() as isize;
    let m = new.len() as isize;
    let max = n + m;
    if max == 0 {
        return Vec::new();
    }

    let offset = max;
    let mut v = vec![0isize; (2 * max + 2) as usize];
    let mut trace: Vec<Vec<isize>> = Vec::new();

    'outer: for d in 0..=max {
        trace.push(v.clone());
        let mut k = -d;
        while k <= d {
            let idx = (k + offset) as usize;
            let mut x = if k == -d || (k != d && v[idx - 1] < v[idx + 1]) {
                v[idx + 1]
            } else {
                v[idx - 1] + 1
            };
            let mut y = x - k;
            while x < n && y < m && old[x as usize] == new[y as usize] {
                x += 1;
                y += 1;
            }
            v[idx] = x;
            if x >= n && y >= m {
                break 'outer;
            }
            k += 2;
        }
    }

    let mut steps = Vec::new();
    let (mut x, mut y) = (n, m);
    for (d, v) in trace.iter().enumerate().rev() {
        let d = d as isize;
        let k = x - y;
        let prev_k = if k == -d || (k != d && v[(k - 1 + offset) as usize] < v[(k + 1 + offset) as usize]) {
            k + 1
        } else {
            k - 1
        };
        let prev_x = v[(prev_k + offset) as usize];
        let prev_y = prev_x - prev_k;

        while x > prev_x && y > prev_y {
            steps.push(Step::Equal);
            x -= 1;
            y -= 1;
        }
        if d > 0 {
            if x == prev_x {
                steps.push(Step::Insert);
            } else {
                steps.push(Step::Delete);
            }
        }
        x = prev_x;
        y = prev_y;
    }
    steps.reverse();
    steps
}

/// Group an edit script into opcodes covering both sequences.
pub fn opcodes<T: PartialEq>(old: &[T], new: &[T]) -> Vec<Opcode> {
    let mut ops = Vec::new();
    let (mut i, mut j) = (0usize, 0usize);
    let mut run_start: Option<(usize, usize, bool)> = None;

    let close = |ops: &mut Vec<Opcode>, start: (usize, usize, bool), i: usize, j: usize| {
        let (i1, j1, equal) = start;
        let tag = if equal {
            OpTag::Equal
        } else if i > i1 && j > j1 {
            OpTag::Replace
        } else if i > i1 {
            OpTag::Delete
        } else {
            OpTag::Insert
        };
        ops.push(Opcode {
            tag,
            i1,
            i2: i,
            j1,
            j2: j,
        });
    };

    for step in myers(old, new) {
        let is_equal = step == Step::Equal;
        match run_start {
            Some(start) if start.2 != is_equal => {
                close(&mut ops, start, i, j);
                run_start = Some((i, j, is_equal));
            }
            None => run_start = Some((i, j, is_equal)),
            _ => {}
        }
        match step {
            Step::Equal => {
                i += 1;
                j += 1;
            }
            Step::Delete => i += 1,
            Step::Insert => j += 1,
        }
    }
    if let Some(start) = run_start {
        close(&mut ops, start, i, j);
    }
    ops
}

/// Turn the difference between two line lists into edits, last edit first,
/// so they can be applied one after another without shifting line numbers.
pub fn line_edits(old: &[&str], new: &[&str]) -> Vec<LineEdit> {
    opcodes(old, new)
        .into_iter()
        .rev()
        .filter(|op| op.tag != OpTag::Equal)
        .map(|op| LineEdit {
            action: op.tag,
            start: op.i1,
            end: op.i2,
            text: match op.tag {
                OpTag::Delete => None,
                _ => Some(new[op.j1..op.j2].concat()),
            },
        })
        .collect()
}

/// Collapse all changes into one `(start, end, text)` replacement covering
/// the first through the last changed line. Returns `None` when the inputs
/// are equal.
pub fn collapsed_edit(old: &[&str], new: &[&str]) -> Option<(usize, usize, String)> {
    let changed: Vec<Opcode> = opcodes(old, new)
        .into_iter()
        .filter(|op| op.tag != OpTag::Equal)
        .collect();
    let first = changed.first()?;
    let last = changed.last()?;
    Some((first.i1, last.i2, new[first.j1..last.j2].concat()))
}

/// Split text into lines, keeping line terminators.
pub fn split_lines(text: &str) -> Vec<&str> {
    text.split_inclusive('\n').collect()
}

/// Apply edits produced by [`line_edits`] to a line list.
pub fn apply_edits(lines: &[&str], edits: &[LineEdit]) -> String {
    let mut out: Vec<String> = lines.iter().map(|s| s.to_string()).collect();
    for edit in edits {
        let replacement: Vec<String> = edit
            .text
            .as_deref()
            .map(|t| split_lines(t).into_iter().map(str::to_string).collect())
            .unwrap_or_default();
        out.splice(edit.start..edit.end, replacement);
    }
    out.concat()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(ops: &[Opcode]) -> Vec<OpTag> {
        ops.iter().map(|op| op.tag).collect()
    }

    #[test]
    fn identical_inputs_are_one_equal_run() {
        let a = ["x\n", "y\n"];
        let ops = opcodes(&a, &a);
        assert_eq!(tags(&ops), vec![OpTag::Equal]);
        assert!(line_edits(&a, &a).is_empty());
        assert_eq!(collapsed_edit(&a, &a), None);
    }

    #[test]
    fn empty_inputs() {
        let empty: [&str; 0] = [];
        assert!(opcodes(&empty, &empty).is_empty());
        let new = ["a\n"];
        let ops = opcodes(&empty, &new);
        assert_eq!(
            ops,
            vec![Opcode {
                tag: OpTag::Insert,
                i1: 0,
                i2: 0,
                j1: 0,
                j2: 1
            }]
        );
    }

    #[test]
    fn insertion_in_the_middle() {
        let old = ["import os\n", "import sys\n"];
        let new = ["import os\n", "import re\n", "import sys\n"];
        let edits = line_edits(&old, &new);
        assert_eq!(
            edits,
            vec![LineEdit {
                action: OpTag::Insert,
                start: 1,
                end: 1,
                text: Some("import re\n".to_string())
            }]
        );
        assert_eq!(
            collapsed_edit(&old, &new),
            Some((1, 1, "import re\n".to_string()))
        );
    }

    #[test]
    fn replacement_and_deletion() {
        let old = ["a\n", "b\n", "c\n", "d\n"];
        let new = ["a\n", "B\n", "c\n"];
        let ops = opcodes(&old, &new);
        assert_eq!(
            tags(&ops),
            vec![OpTag::Equal, OpTag::Replace, OpTag::Equal, OpTag::Delete]
        );
        let edits = line_edits(&old, &new);
        // Last change first.
        assert_eq!(edits[0].action, OpTag::Delete);
        assert_eq!((edits[0].start, edits[0].end), (3, 4));
        assert_eq!(edits[0].text, None);
        assert_eq!(edits[1].action, OpTag::Replace);
        assert_eq!(edits[1].text.as_deref(), Some("B\n"));
    }

    #[test]
    fn collapsed_edit_spans_all_changes() {
        let old = ["a\n", "b\n", "c\n", "d\n"];
        let new = ["x\n", "b\n", "c\n", "y\n"];
        assert_eq!(
            collapsed_edit(&old, &new),
            Some((0, 4, "x\nb\nc\ny\n".to_string()))
        );
    }

    #[test]
    fn applying_edits_reproduces_target() {
        let old_text = "from a import b\nimport os\nimport sys\n\nx = 1\n";
        let new_text = "import os\nimport sys\n\nfrom a import b, c\n\nx = 1\n";
        let old = split_lines(old_text);
        let new = split_lines(new_text);
        let edits = line_edits(&old, &new);
        assert_eq!(apply_edits(&old, &edits), new_text);
    }

    #[test]
    fn opcodes_cover_both_sequences() {
        let old = ["1", "2", "3", "4", "5", "6"];
        let new = ["0", "2", "3", "5", "7", "6", "8"];
        let ops = opcodes(&old, &new);
        let mut i = 0;
        let mut j = 0;
        for op in &ops {
            assert_eq!(op.i1, i);
            assert_eq!(op.j1, j);
            i = op.i2;
            j = op.j2;
        }
        assert_eq!((i, j), (old.len(), new.len()));
    }
}
