//! # Command block extraction
//!
//! Pulls fenced blocks out of a model reply. The scanner is line based with
//! two states, outside a fence and inside one; the inside state remembers the
//! delimiter that opened it so that a different fence style inside a block is
//! treated as content.
//!
//! - An opening fence is a run of three or more `` ` `` or `~`, optionally
//!   followed by a language hint that is ignored.
//! - A closing fence is a line holding only the opening character, repeated at
//!   least as many times as the opener.
//! - A closing run glued to the end of a content line (`echo hi```) also
//!   closes the block.
//! - Blocks are trimmed; empty blocks are dropped; a fence still open at the
//!   end of the reply is not a block.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::str::Lines;

/// One command extracted from a reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandBlock {
    pub command: String,
    /// Position among the blocks of the reply, starting at 0
    pub ordinal: usize,
}

/// Lazily extract command blocks from `reply`.
///
/// The returned iterator is `Clone`, so a caller can restart the scan
/// without re-reading the reply.
pub fn extract(reply: &str) -> CommandBlocks<'_> {
    CommandBlocks {
        pieces: Pieces::new(reply),
        next_ordinal: 0,
    }
}

/// The reply with every fenced region removed
pub fn prose(reply: &str) -> String {
    let lines: Vec<&str> = Pieces::new(reply)
        .filter_map(|piece| match piece {
            Piece::Prose(line) => Some(line),
            Piece::Block(_) => None,
        })
        .collect();
    lines.join("\n").trim().to_string()
}

/// Iterator over the command blocks of one reply
#[derive(Debug, Clone)]
pub struct CommandBlocks<'a> {
    pieces: Pieces<'a>,
    next_ordinal: usize,
}

impl Iterator for CommandBlocks<'_> {
    type Item = CommandBlock;

    fn next(&mut self) -> Option<CommandBlock> {
        loop {
            match self.pieces.next()? {
                Piece::Prose(_) => continue,
                Piece::Block(body) => {
                    let command = body.trim();
                    if command.is_empty() {
                        continue;
                    }
                    let ordinal = self.next_ordinal;
                    self.next_ordinal += 1;
                    return Some(CommandBlock {
                        command: command.to_string(),
                        ordinal,
                    });
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fence {
    ch: char,
    len: usize,
}

#[derive(Debug, Clone)]
enum ScanState<'a> {
    Outside,
    Inside {
        fence: Fence,
        opener: &'a str,
        body: Vec<&'a str>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece<'a> {
    Prose(&'a str),
    Block(String),
}

#[derive(Debug, Clone)]
struct Pieces<'a> {
    lines: Lines<'a>,
    state: ScanState<'a>,
    /// Lines of an unterminated fence handed back as prose
    spill: VecDeque<&'a str>,
}

impl<'a> Pieces<'a> {
    fn new(reply: &'a str) -> Self {
        Self {
            lines: reply.lines(),
            state: ScanState::Outside,
            spill: VecDeque::new(),
        }
    }
}

impl<'a> Iterator for Pieces<'a> {
    type Item = Piece<'a>;

    fn next(&mut self) -> Option<Piece<'a>> {
        if let Some(line) = self.spill.pop_front() {
            return Some(Piece::Prose(line));
        }

        loop {
            let Some(line) = self.lines.next() else {
                if let ScanState::Inside { opener, body, .. } =
                    std::mem::replace(&mut self.state, ScanState::Outside)
                {
                    self.spill.extend(body);
                    return Some(Piece::Prose(opener));
                }
                return None;
            };

            match &mut self.state {
                ScanState::Outside => match opening_fence(line) {
                    Some(fence) => {
                        self.state = ScanState::Inside {
                            fence,
                            opener: line,
                            body: Vec::new(),
                        };
                    }
                    None => return Some(Piece::Prose(line)),
                },
                ScanState::Inside { fence, body, .. } => {
                    let fence = *fence;
                    if is_closing_fence(line, fence) {
                        let block = body.join("\n");
                        self.state = ScanState::Outside;
                        return Some(Piece::Block(block));
                    }
                    if let Some(content) = strip_trailing_fence(line, fence) {
                        body.push(content);
                        let block = body.join("\n");
                        self.state = ScanState::Outside;
                        return Some(Piece::Block(block));
                    }
                    body.push(line);
                }
            }
        }
    }
}

/// Length of the leading run of `ch` in `s`
fn run_len(s: &str, ch: char) -> usize {
    s.chars().take_while(|&c| c == ch).count()
}

fn opening_fence(line: &str) -> Option<Fence> {
    let trimmed = line.trim_start();
    let ch = trimmed.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let len = run_len(trimmed, ch);
    if len < 3 {
        return None;
    }
    let hint = &trimmed[len * ch.len_utf8()..];
    // A backtick in the hint means this is inline code, not a fence
    if ch == '`' && hint.contains('`') {
        return None;
    }
    Some(Fence { ch, len })
}

fn is_closing_fence(line: &str, fence: Fence) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty() && trimmed.chars().all(|c| c == fence.ch) && trimmed.chars().count() >= fence.len
}

fn strip_trailing_fence(line: &str, fence: Fence) -> Option<&str> {
    let trimmed = line.trim_end();
    let content = trimmed.trim_end_matches(fence.ch);
    let run = trimmed.len() - content.len();
    if run / fence.ch.len_utf8() >= fence.len && !content.trim().is_empty() {
        Some(content)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn commands(reply: &str) -> Vec<String> {
        extract(reply).map(|b| b.command).collect()
    }

    #[test]
    fn test_single_block_with_language_hint() {
        let blocks: Vec<CommandBlock> = extract("```bash\necho hi\n```").collect();
        assert_eq!(
            blocks,
            vec![CommandBlock { command: "echo hi".into(), ordinal: 0 }]
        );
    }

    #[test]
    fn test_multiple_blocks_keep_order() {
        let reply = "First install:\n```sh\napt-get install afl++\n```\nThen run:\n```\nafl-fuzz -i in -o out -- ./target @@\n```\n";
        let blocks: Vec<CommandBlock> = extract(reply).collect();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].command, "apt-get install afl++");
        assert_eq!(blocks[1].command, "afl-fuzz -i in -o out -- ./target @@");
        assert_eq!(blocks[1].ordinal, 1);
    }

    #[test]
    fn test_no_blocks() {
        assert!(commands("Just use your judgement.").is_empty());
        assert!(commands("").is_empty());
    }

    #[test]
    fn test_empty_and_whitespace_blocks_are_dropped() {
        let reply = "```\n```\n```bash\n   \n\t\n```\n```\nls\n```";
        let blocks: Vec<CommandBlock> = extract(reply).collect();
        assert_eq!(blocks, vec![CommandBlock { command: "ls".into(), ordinal: 0 }]);
    }

    #[test]
    fn test_multiline_block_is_trimmed_not_joined() {
        let reply = "```bash\n\n  mkdir -p out\n  cd out\n\n```";
        assert_eq!(commands(reply), vec!["mkdir -p out\n  cd out".to_string()]);
    }

    #[test]
    fn test_adjacent_fences() {
        let reply = "```\na\n```\n```\nb\n```";
        assert_eq!(commands(reply), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_other_fence_style_inside_block_is_content() {
        let reply = "~~~~markdown\n```bash\nls\n```\n~~~~\n";
        assert_eq!(commands(reply), vec!["```bash\nls\n```".to_string()]);
    }

    #[test]
    fn test_short_run_does_not_close_longer_fence() {
        let reply = "````\nprintf '```'\n```\n````";
        assert_eq!(commands(reply), vec!["printf '```'\n```".to_string()]);
    }

    #[test]
    fn test_closing_run_glued_to_content() {
        assert_eq!(commands("```bash\necho hi```\nafter"), vec!["echo hi".to_string()]);
    }

    #[test]
    fn test_unterminated_fence_is_dropped() {
        assert!(commands("```bash\nrm -rf build\n").is_empty());
        assert_eq!(prose("intro\n```bash\nrm -rf build"), "intro\n```bash\nrm -rf build");
    }

    #[test]
    fn test_inline_triple_backticks_are_not_fences() {
        assert!(commands("Use ```ls``` to list.").is_empty());
    }

    #[test]
    fn test_crlf_replies() {
        assert_eq!(commands("```bash\r\necho hi\r\n```\r\n"), vec!["echo hi".to_string()]);
    }

    #[test]
    fn test_extraction_is_restartable_and_idempotent() {
        let reply = "```\none\n```\ntext\n```\ntwo\n```";
        let blocks = extract(reply);
        let first: Vec<CommandBlock> = blocks.clone().collect();
        let second: Vec<CommandBlock> = blocks.collect();
        assert_eq!(first, second);
        assert_eq!(first, extract(reply).collect::<Vec<_>>());
    }

    #[test]
    fn test_prose_strips_blocks() {
        let reply = "Run this:\n```bash\nmake\n```\nThen check the output.";
        assert_eq!(prose(reply), "Run this:\nThen check the output.");
    }
}
