//! Input field handling for the terminal user interface.

/// A text input field. The cursor counts characters, not bytes.
#[derive(Clone, Debug, Default)]
pub struct InputField {
    pub value: String,
    pub cursor: usize,
}

impl InputField {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an input field with initial text, cursor at the end.
    pub fn with_value(value: &str) -> Self {
        Self { value: value.to_string(), cursor: value.chars().count() }
    }

    fn byte_index(&self, char_idx: usize) -> usize {
        self.value.char_indices().nth(char_idx).map(|(i, _)| i).unwrap_or(self.value.len())
    }

    fn len(&self) -> usize {
        self.value.chars().count()
    }

    /// Insert a character at the current cursor position.
    pub fn handle_char(&mut self, c: char) {
        let at = self.byte_index(self.cursor);
        self.value.insert(at, c);
        self.cursor += 1;
    }

    /// Delete the character before the cursor.
    pub fn handle_backspace(&mut self) {
        if self.cursor > 0 {
            let at = self.byte_index(self.cursor - 1);
            self.value.remove(at);
            self.cursor -= 1;
        }
    }

    /// Delete the character at the cursor position.
    pub fn handle_delete(&mut self) {
        if self.cursor < self.len() {
            let at = self.byte_index(self.cursor);
            self.value.remove(at);
        }
    }

    pub fn move_cursor_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn move_cursor_right(&mut self) {
        if self.cursor < self.len() {
            self.cursor += 1;
        }
    }

    /// Text with a block cursor drawn in, for the focused field.
    pub fn with_cursor(&self) -> String {
        let at = self.byte_index(self.cursor);
        format!("{}█{}", &self.value[..at], &self.value[at..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn editing_multibyte_text() {
        let mut field = InputField::with_value("護理");
        assert_eq!(field.cursor, 2);
        field.handle_char('師');
        assert_eq!(field.value, "護理師");
        field.move_cursor_left();
        field.handle_backspace();
        assert_eq!(field.value, "護師");
        field.handle_delete();
        assert_eq!(field.value, "護");
        assert_eq!(field.with_cursor(), "護█");
    }

    #[test]
    fn cursor_stays_in_bounds() {
        let mut field = InputField::new();
        field.move_cursor_left();
        field.handle_backspace();
        field.handle_delete();
        field.move_cursor_right();
        assert_eq!(field.cursor, 0);
        assert!(field.value.is_empty());
    }
}
