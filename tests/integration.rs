use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn dossier_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("dossier");
    path
}

/// One `四-1` sheet with a header block and a single data row at row 6.
fn write_spreadsheet(path: &Path) {
    let sheet = r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData><row r="1"><c r="A1" t="inlineStr"><is><t>学历学位材料</t></is></c></row><row r="6"><c r="A6" t="inlineStr"><is><t>4-1-1</t></is></c><c r="B6" t="inlineStr"><is><t>本科毕业证书</t></is></c><c r="C6"><v>2005</v></c><c r="D6"><v>7</v></c><c r="E6"><v>1</v></c><c r="F6"><v>2</v></c></row></sheetData></worksheet>"#;
    let workbook = r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="四-1" sheetId="1" r:id="rId1"/></sheets></workbook>"#;
    let rels = r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#;

    let file = fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let opts = zip::write::SimpleFileOptions::default();
    zip.start_file("xl/workbook.xml", opts).unwrap();
    zip.write_all(workbook.as_bytes()).unwrap();
    zip.start_file("xl/_rels/workbook.xml.rels", opts).unwrap();
    zip.write_all(rels.as_bytes()).unwrap();
    zip.start_file("xl/worksheets/sheet1.xml", opts).unwrap();
    zip.write_all(sheet.as_bytes()).unwrap();
    zip.finish().unwrap();
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::create_dir_all(root.join("data")).unwrap();

    // Two people share a name; only 007 has a spreadsheet.
    let archive = root.join("archive");
    let zhang_007 = archive.join("007张三");
    let zhang_008 = archive.join("008张三");
    let catalog = archive.join("目录");
    for dir in [&zhang_007, &zhang_008, &catalog] {
        fs::create_dir_all(dir).unwrap();
    }
    fs::write(zhang_007.join("4-1-1.pdf"), b"%PDF-1.4").unwrap();
    fs::write(zhang_007.join("1-1.pdf"), b"%PDF-1.4").unwrap();
    fs::write(zhang_007.join("notes.txt"), b"not indexed").unwrap();
    fs::write(zhang_008.join("4-1-2.pdf"), b"%PDF-1.4").unwrap();
    write_spreadsheet(&catalog.join("007张三.xlsx"));

    let config_content = format!(
        r#"[db]
path = "{root}/data/dossier.sqlite"

[archive]
root = "{root}/archive"

[server]
bind = "127.0.0.1:7341"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("dossier.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_dossier(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = dossier_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run dossier binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn imported_env() -> (TempDir, PathBuf) {
    let (tmp, config_path) = setup_test_env();
    let (_, stderr, ok) = run_dossier(&config_path, &["init"]);
    assert!(ok, "init failed: {}", stderr);
    let (stdout, stderr, ok) = run_dossier(&config_path, &["import", "--progress", "off"]);
    assert!(ok, "import failed: stdout={}, stderr={}", stdout, stderr);
    (tmp, config_path)
}

fn search_json(config_path: &Path, args: &[&str]) -> serde_json::Value {
    let mut full = vec!["search", "--json"];
    full.extend_from_slice(args);
    let (stdout, stderr, ok) = run_dossier(config_path, &full);
    assert!(ok, "search failed: stdout={}, stderr={}", stdout, stderr);
    serde_json::from_str(&stdout).unwrap()
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_dossier(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_dossier(&config_path, &["init"]);
    assert!(success1, "First init failed");
    let (_, _, success2) = run_dossier(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_import_counts_people_and_pdfs() {
    let (_tmp, config_path) = setup_test_env();
    run_dossier(&config_path, &["init"]);

    let (stdout, stderr, success) = run_dossier(&config_path, &["import", "--progress", "off"]);
    assert!(success, "import failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("persons:  2"), "stdout={}", stdout);
    assert!(stdout.contains("files:    3"), "stdout={}", stdout);
    assert!(stdout.contains("ok"));
}

#[test]
fn test_import_dry_run_writes_nothing() {
    let (_tmp, config_path) = setup_test_env();
    run_dossier(&config_path, &["init"]);

    let (stdout, _, success) =
        run_dossier(&config_path, &["import", "--dry-run", "--progress", "off"]);
    assert!(success);
    assert!(stdout.contains("(dry-run)"));

    let (stdout, _, _) = run_dossier(&config_path, &["stats"]);
    assert!(stdout.contains("Files:       0"), "stdout={}", stdout);
}

#[test]
fn test_import_missing_root_fails() {
    let (tmp, config_path) = setup_test_env();
    run_dossier(&config_path, &["init"]);

    let missing = tmp.path().join("nowhere");
    let (_, stderr, success) = run_dossier(
        &config_path,
        &["import", missing.to_str().unwrap(), "--progress", "off"],
    );
    assert!(!success);
    assert!(stderr.contains("nowhere"), "stderr={}", stderr);
}

#[test]
fn test_search_duplicate_name_lists_candidates() {
    let (_tmp, config_path) = imported_env();

    let outcome = search_json(&config_path, &["--name", "张三"]);
    assert_eq!(outcome["status"], "duplicate_name");
    let ids: Vec<&str> = outcome["candidates"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["person_id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["007", "008"]);
}

#[test]
fn test_search_by_id_and_category_attaches_metadata() {
    let (_tmp, config_path) = imported_env();

    let outcome = search_json(
        &config_path,
        &["--name", "张三", "--id", "007", "--category", "4-1"],
    );
    assert_eq!(outcome["status"], "hits");
    let hits = outcome["hits"].as_array().unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["file"]["classification_code"], "4-1-1");
    assert_eq!(hits[0]["metadata"]["material_name"], "本科毕业证书");
    assert_eq!(hits[0]["metadata"]["date"], "2005-7-1");
    assert_eq!(hits[0]["metadata"]["page_count"], "2");
    assert!(hits[0]["warning"].is_null());
}

#[test]
fn test_search_category_by_display_label() {
    let (_tmp, config_path) = imported_env();

    let outcome = search_json(&config_path, &["--id", "007", "--category", "一、履历材料"]);
    let hits = outcome["hits"].as_array().unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["file"]["file_name"], "1-1.pdf");
}

#[test]
fn test_search_missing_spreadsheet_is_a_warning() {
    let (_tmp, config_path) = imported_env();

    let outcome = search_json(&config_path, &["--id", "008"]);
    let hits = outcome["hits"].as_array().unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0]["metadata"].is_null());
    assert_eq!(hits[0]["warning"]["kind"], "spreadsheet_not_found");
}

#[test]
fn test_search_without_name_or_id_fails() {
    let (_tmp, config_path) = imported_env();

    let (_, stderr, success) = run_dossier(&config_path, &["search", "--category", "4-1"]);
    assert!(!success);
    assert!(!stderr.is_empty());
}

#[test]
fn test_search_unknown_name_prints_no_results() {
    let (_tmp, config_path) = imported_env();

    let (stdout, _, success) = run_dossier(&config_path, &["search", "--name", "李四"]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_categories_without_config() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("absent.toml");

    let (stdout, stderr, success) = run_dossier(&config_path, &["categories"]);
    assert!(success, "categories failed: {}", stderr);
    assert!(stdout.contains("一、履历材料"));
    assert!(stdout.contains("4-1"));

    let (stdout, _, success) = run_dossier(&config_path, &["categories", "九、工资、任免、出国和会议代表等材料", "--json"]);
    assert!(success);
    let children: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(children.as_array().unwrap().len(), 4);

    let (_, _, success) = run_dossier(&config_path, &["categories", "不存在"]);
    assert!(!success);
}

#[test]
fn test_catalog_dumps_sheets() {
    let (_tmp, config_path) = imported_env();

    let (stdout, stderr, success) = run_dossier(
        &config_path,
        &["catalog", "--id", "007", "--name", "张三", "--json"],
    );
    assert!(success, "catalog failed: {}", stderr);
    let sheets: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let first = &sheets.as_array().unwrap()[0];
    assert_eq!(first["sheet"], "四-1");
    assert_eq!(first["rows"][0]["classification_code"], "4-1-1");
}

#[test]
fn test_prune_drops_deleted_files() {
    let (tmp, config_path) = imported_env();

    fs::remove_file(tmp.path().join("archive/007张三/1-1.pdf")).unwrap();
    let (stdout, _, success) = run_dossier(&config_path, &["prune"]);
    assert!(success);
    assert!(stdout.contains("pruned 1"), "stdout={}", stdout);

    let outcome = search_json(&config_path, &["--id", "007"]);
    assert_eq!(outcome["hits"].as_array().unwrap().len(), 1);
}

#[test]
fn test_stats_reports_counts() {
    let (_tmp, config_path) = imported_env();

    let (stdout, stderr, success) = run_dossier(&config_path, &["stats"]);
    assert!(success, "stats failed: {}", stderr);
    assert!(stdout.contains("Persons:     2"));
    assert!(stdout.contains("Files:       3"));
    assert!(stdout.contains("学历学位材料") || stdout.contains("四、"));
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_dossier(&tmp.path().join("absent.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config"));
}
