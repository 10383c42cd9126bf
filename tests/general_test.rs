use alloy_graph::parser::Parser;
use alloy_graph::serialization::to_config_string;
use miette::Report;
use std::fs;
use std::path::PathBuf;

fn alloy_files(subdir: &str) -> Vec<PathBuf> {
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests").join(subdir);
    let entries = fs::read_dir(&dir).expect("Failed to read tests directory");

    let mut files: Vec<PathBuf> = entries
        .map(|entry| entry.expect("Failed to read directory entry").path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "alloy"))
        .collect();
    files.sort();
    assert!(!files.is_empty(), "no .alloy files in {:?}", dir);
    files
}

#[test]
fn test_all_ok_files_parse_cleanly_and_round_trip() {
    for path in alloy_files("ok") {
        println!("Parsing file: {:?}", path);
        let source = fs::read_to_string(&path).expect("Failed to read file");
        let name = path.display().to_string();

        let parsed = Parser::new_with_name(&source, name.clone()).parse_document();
        if let Some(err) = parsed.diagnostics.first() {
            panic!("Failed to parse {:?}. Error: {:?}", path, Report::new(err.clone()));
        }

        let text = to_config_string(&parsed.nodes);
        let reparsed = Parser::new_with_name(&text, name).parse_document();
        assert!(reparsed.is_clean(), "serialized {:?} does not parse:\n{}", path, text);
        assert_eq!(reparsed.nodes, parsed.nodes, "round trip changed {:?}", path);
    }
}

#[test]
fn test_all_err_files_report_diagnostics() {
    for path in alloy_files("err") {
        let source = fs::read_to_string(&path).expect("Failed to read file");
        let parsed = Parser::new(&source).parse_document();
        assert!(!parsed.is_clean(), "{:?} should not parse cleanly", path);
    }
}
