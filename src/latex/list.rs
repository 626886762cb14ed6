use crate::error::Error;
use crate::model::{Block, ListKind, ListMarker, NumberFormat, Paragraph, ParagraphKind};

use super::{Emitter, Mode, bracket_guard};

/// LaTeX's enumerate nests at most four levels deep.
pub(super) const MAX_LIST_DEPTH: usize = 4;

const COUNTERS: [&str; MAX_LIST_DEPTH] = ["enumi", "enumii", "enumiii", "enumiv"];

pub(super) struct ListEntry<'a> {
    pub(super) num_id: &'a str,
    pub(super) level: u8,
    pub(super) marker: ListMarker,
    pub(super) paragraph: &'a Paragraph,
}

pub(super) enum Segment<'a> {
    Block(&'a Block),
    List(Vec<ListEntry<'a>>),
}

fn list_entry(block: &Block) -> Option<ListEntry<'_>> {
    match block {
        Block::Paragraph(
            paragraph @ Paragraph {
                kind:
                    ParagraphKind::ListItem {
                        num_id,
                        level,
                        marker,
                    },
                ..
            },
        ) => Some(ListEntry {
            num_id,
            level: *level,
            marker: *marker,
            paragraph,
        }),
        _ => None,
    }
}

/// Group consecutive list-item paragraphs into runs; everything else
/// passes through as a single block.
pub(super) fn segments(blocks: &[Block]) -> Vec<Segment<'_>> {
    blocks.iter().fold(Vec::new(), |mut acc, block| {
        match list_entry(block) {
            Some(entry) => match acc.last_mut() {
                Some(Segment::List(entries)) => entries.push(entry),
                _ => acc.push(Segment::List(vec![entry])),
            },
            None => acc.push(Segment::Block(block)),
        }
        acc
    })
}

struct OpenList<'a> {
    num_id: &'a str,
    level: u8,
    ordered: bool,
}

fn label_command(format: NumberFormat, counter: &str) -> Option<String> {
    let numeral = match format {
        NumberFormat::Decimal => return None,
        NumberFormat::LowerLetter => "alph",
        NumberFormat::UpperLetter => "Alph",
        NumberFormat::LowerRoman => "roman",
        NumberFormat::UpperRoman => "Roman",
    };
    Some(format!(
        "\\renewcommand{{\\label{counter}}}{{\\{numeral}{{{counter}}}.}}\n"
    ))
}

impl<'d> Emitter<'d> {
    pub(super) fn list(&mut self, entries: &[ListEntry<'d>]) -> Result<(), Error> {
        let mut stack: Vec<OpenList<'d>> = Vec::new();

        for entry in entries {
            let ordered = matches!(entry.marker.kind, ListKind::Ordered(_));
            while let Some(top) = stack.last() {
                let sibling_mismatch = top.level == entry.level
                    && (top.num_id != entry.num_id || top.ordered != ordered);
                if top.level > entry.level || sibling_mismatch {
                    self.close_list(top.ordered);
                    stack.pop();
                } else {
                    break;
                }
            }

            let needs_open = stack.last().is_none_or(|top| top.level < entry.level);
            if needs_open {
                if stack.len() < MAX_LIST_DEPTH {
                    // enumerate counters nest independently of itemize
                    let enum_depth = stack.iter().filter(|open| open.ordered).count();
                    self.open_list(entry, enum_depth);
                    stack.push(OpenList {
                        num_id: entry.num_id,
                        level: entry.level,
                        ordered,
                    });
                } else {
                    log::debug!(
                        "List level {} exceeds LaTeX nesting, kept at depth {MAX_LIST_DEPTH}",
                        entry.level
                    );
                }
            }

            if ordered {
                self.count_item(entry.num_id, entry.level);
            }
            let text = self.inlines(&entry.paragraph.inlines, Mode::Paragraph)?;
            let text = text.trim_start();
            self.push(&format!("\\item {}{text}\n", bracket_guard(text)));
        }

        while let Some(top) = stack.pop() {
            self.close_list(top.ordered);
        }
        self.push("\n");
        Ok(())
    }

    fn open_list(&mut self, entry: &ListEntry<'d>, enum_depth: usize) {
        let ListKind::Ordered(format) = entry.marker.kind else {
            self.push("\\begin{itemize}\n");
            return;
        };
        let counter = COUNTERS[enum_depth.min(MAX_LIST_DEPTH - 1)];
        self.push("\\begin{enumerate}\n");
        if let Some(label) = label_command(format, counter) {
            self.push(&label);
        }

        // Deeper counters restart whenever a shallower item of the same
        // list appears.
        let key = (entry.num_id.to_string(), entry.level);
        let offset = if self.options.preserve_line_breaks {
            entry.marker.start.saturating_sub(1)
        } else {
            match self.list_numbers.get(&key) {
                Some(last) => *last,
                None => entry.marker.start.saturating_sub(1),
            }
        };
        self.list_numbers.insert(key, offset);
        if offset > 0 {
            self.push(&format!("\\setcounter{{{counter}}}{{{offset}}}\n"));
        }
    }

    fn close_list(&mut self, ordered: bool) {
        if ordered {
            self.push("\\end{enumerate}\n");
        } else {
            self.push("\\end{itemize}\n");
        }
    }

    fn count_item(&mut self, num_id: &str, level: u8) {
        if let Some(n) = self.list_numbers.get_mut(&(num_id.to_string(), level)) {
            *n += 1;
        }
        self.list_numbers
            .retain(|(id, lvl), _| id != num_id || *lvl <= level);
    }
}
