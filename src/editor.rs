//! Editor integration: mode lines at the top of the running log and fold-marker mapping.

use anyhow::anyhow;
use clap::ValueEnum;

const FOLD_OPEN: &str = "{{{";
const FOLD_CLOSE: &str = "}}}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Editor {
    Vim,
    Emacs,
}

impl Editor {
    pub fn mode_line(self) -> &'static str {
        match self {
            Editor::Vim => "vim: set sw=4 sts=4 et fdm=marker:",
            Editor::Emacs => "-*- mode: nestedtext -*-",
        }
    }
}

/// Replacements for fold markers found in incoming log text, so that they do
/// not open folds in the running log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldMarkers {
    open: String,
    close: String,
}

impl FoldMarkers {
    pub fn apply(&self, text: &str) -> String {
        text.replace(FOLD_OPEN, &self.open)
            .replace(FOLD_CLOSE, &self.close)
    }
}

impl std::str::FromStr for FoldMarkers {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let tokens: Vec<&str> = s.split_whitespace().collect();
        match tokens.as_slice() {
            [open, close] => Ok(Self {
                open: open.to_string(),
                close: close.to_string(),
            }),
            _ => Err(anyhow!("value must consist of two space separated tokens.")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_are_mapped() {
        let markers: FoldMarkers = "<<< >>>".parse().unwrap();
        assert_eq!(markers.apply("step {{{1\nbody\n}}}"), "step <<<1\nbody\n>>>");
    }

    #[test]
    fn mapping_needs_two_tokens() {
        assert!("<<<".parse::<FoldMarkers>().is_err());
        assert!("a b c".parse::<FoldMarkers>().is_err());
    }

    #[test]
    fn mode_lines_name_the_format() {
        assert!(Editor::Vim.mode_line().contains("fdm=marker"));
        assert!(Editor::Emacs.mode_line().starts_with("-*-"));
    }
}
