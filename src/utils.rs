/// Calculates the 1-based line and column number for a given byte position in the source text.
/// This function is designed to be called only when a diagnostic is reported, as it iterates
/// through the source text to determine the position.
pub fn get_line_and_column(source: &str, position: usize) -> (usize, usize) {
    let mut line = 1;
    let mut column = 1;
    for (i, c) in source.char_indices() {
        if i >= position {
            break;
        }
        if c == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    (line, column)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_and_column() {
        let source = "a {\n  x = 1\n}";
        assert_eq!(get_line_and_column(source, 0), (1, 1));
        assert_eq!(get_line_and_column(source, 6), (2, 3));
        assert_eq!(get_line_and_column(source, source.len()), (3, 2));
    }

    #[test]
    fn test_multibyte_characters_count_once() {
        let source = "é = 1";
        assert_eq!(get_line_and_column(source, "é".len()), (1, 2));
    }
}
