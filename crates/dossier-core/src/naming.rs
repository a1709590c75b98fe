//! Filesystem naming conventions.
//!
//! Person directories are named `<digits><name>` (`"007张三"`), or just
//! `<name>` when the archive has no numeric ids. Document files are named by
//! their classification code (`"4-1-3.pdf"`). Parsing never validates codes
//! against the taxonomy; unknown codes simply fail later lookups.

/// Split a person directory name into `(person_id, person_name)`.
///
/// The leading run of ASCII digits is the id and the trimmed remainder is
/// the name. Without leading digits the id is empty and the whole input is
/// the name.
pub fn parse_directory_name(name: &str) -> (String, String) {
    let digits = name.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return (String::new(), name.to_string());
    }
    let (id, rest) = name.split_at(digits);
    (id.to_string(), rest.trim().to_string())
}

/// The classification code of a file: its name without the final extension.
pub fn parse_classification_code(file_name: &str) -> String {
    match file_name.rfind('.') {
        Some(dot) if dot > 0 => file_name[..dot].to_string(),
        _ => file_name.to_string(),
    }
}

/// Names starting with `.` or `~` are hidden or editor temp files.
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.') || name.starts_with('~')
}

pub fn has_pdf_extension(file_name: &str) -> bool {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

/// Spreadsheet name expected for a person: `"<id><name>.xlsx"`, no separator.
pub fn expected_spreadsheet_name(person_id: &str, person_name: &str) -> String {
    format!("{}{}.xlsx", person_id, person_name)
}

/// Digit groups of a code, in order. `"4.1.3"` and `"4-1-3"` agree.
pub fn code_components(code: &str) -> Vec<&str> {
    code.split(|c: char| !c.is_ascii_digit())
        .filter(|part| !part.is_empty())
        .collect()
}

/// Canonical dash-joined form used for tolerant code comparison.
pub fn normalize_code(code: &str) -> String {
    code_components(code).join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_with_id() {
        assert_eq!(
            parse_directory_name("007张三"),
            ("007".to_string(), "张三".to_string())
        );
        assert_eq!(
            parse_directory_name("12  李四 "),
            ("12".to_string(), "李四".to_string())
        );
    }

    #[test]
    fn directory_without_id() {
        assert_eq!(
            parse_directory_name("王五"),
            (String::new(), "王五".to_string())
        );
        // Untrimmed when there is no id.
        assert_eq!(
            parse_directory_name(" 赵六"),
            (String::new(), " 赵六".to_string())
        );
    }

    #[test]
    fn directory_of_only_digits() {
        assert_eq!(
            parse_directory_name("2024"),
            ("2024".to_string(), String::new())
        );
    }

    #[test]
    fn code_from_generated_file_names() {
        for code in ["1", "4-1", "4-1-3", "9-4-12", "10-2"] {
            let file = format!("{}.pdf", code);
            assert_eq!(parse_classification_code(&file), code);
        }
        assert_eq!(parse_classification_code("4.1.3.pdf"), "4.1.3");
        assert_eq!(parse_classification_code("noext"), "noext");
    }

    #[test]
    fn hidden_and_pdf_checks() {
        assert!(is_hidden(".DS_Store"));
        assert!(is_hidden("~$1-1.xlsx"));
        assert!(!is_hidden("1-1.pdf"));
        assert!(has_pdf_extension("1-1.PDF"));
        assert!(!has_pdf_extension("1-1.docx"));
        assert!(!has_pdf_extension("pdf"));
    }

    #[test]
    fn normalization_collapses_separator_drift() {
        assert_eq!(normalize_code("4.1.3"), "4-1-3");
        assert_eq!(normalize_code(" 4－1－3 "), "4-1-3");
        assert_eq!(normalize_code("4-1-3"), "4-1-3");
        assert_eq!(normalize_code("材料"), "");
    }

    #[test]
    fn spreadsheet_name_has_no_separator() {
        assert_eq!(expected_spreadsheet_name("007", "张三"), "007张三.xlsx");
        assert_eq!(expected_spreadsheet_name("", "王五"), "王五.xlsx");
    }
}
