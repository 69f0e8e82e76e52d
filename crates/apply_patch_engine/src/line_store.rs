use thiserror::Error;

/// One file's content as an ordered sequence of lines.
///
/// Content is split on `\n` with no trailing-line special casing, so `""` is one
/// empty line and `"a\n"` is `["a", ""]`. Joining with `\n` reproduces the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineStore {
    lines: Vec<String>,
}

/// Outcome of a single-line substitution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replacement {
    Applied,
    /// `old_text` does not occur in the line; the line is unchanged.
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineError {
    #[error("line {line_number} is out of range (file has {len} lines)")]
    OutOfRange { line_number: usize, len: usize },
}

impl LineStore {
    pub fn from_text(content: &str) -> Self {
        Self {
            lines: content.split('\n').map(str::to_owned).collect(),
        }
    }

    pub fn to_text(&self) -> String {
        self.lines.join("\n")
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Always false: even empty content is one empty line.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// 1-based line access.
    pub fn line(&self, line_number: usize) -> Option<&str> {
        line_number
            .checked_sub(1)
            .and_then(|index| self.lines.get(index))
            .map(String::as_str)
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    /// Replaces the whole content, as if rebuilt with [`LineStore::from_text`].
    pub fn replace_all(&mut self, content: &str) {
        *self = Self::from_text(content);
    }

    /// Replaces the first occurrence of `old_text` in line `line_number` (1-based).
    ///
    /// An empty `old_text` matches at the start of the line, so `new_text` is prepended.
    pub fn replace_line(
        &mut self,
        line_number: usize,
        old_text: &str,
        new_text: &str,
    ) -> Result<Replacement, LineError> {
        let len = self.lines.len();
        let line = line_number
            .checked_sub(1)
            .and_then(|index| self.lines.get_mut(index))
            .ok_or(LineError::OutOfRange { line_number, len })?;

        match line.find(old_text) {
            Some(start) => {
                line.replace_range(start..start + old_text.len(), new_text);
                Ok(Replacement::Applied)
            }
            None => Ok(Replacement::NotFound),
        }
    }
}
