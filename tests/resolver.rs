use std::io::{Cursor, Write};
use std::path::Path;

use camino::Utf8PathBuf;

use edinet_filing_manager::domain::EntityCode;
use edinet_filing_manager::error::FilingError;
use edinet_filing_manager::resolver::{self, CodeListClient};
use edinet_filing_manager::store::Store;

struct MockCodeList;

impl CodeListClient for MockCodeList {
    fn download_code_list(&self, destination: &Path) -> Result<(), FilingError> {
        let csv = "ダウンロード実行日,2024-06-01\n\
             ＥＤＩＮＥＴコード,提出者種別,提出者名,証券コード\n\
             E12345,内国法人・組合,テスト株式会社,62540\n\
             E54321,内国法人・組合,未上場会社,\n";
        let (encoded, _, _) = encoding_rs::SHIFT_JIS.encode(csv);

        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default();
        writer
            .start_file("EdinetcodeDlInfo.csv", options)
            .unwrap();
        writer.write_all(&encoded).unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| FilingError::Filesystem(err.to_string()))?;
        }
        std::fs::write(destination, bytes)
            .map_err(|err| FilingError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

#[test]
fn resolve_all_extracts_and_parses_master_list() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let store = Store::new_with_root(root);

    let entities = resolver::resolve_all(&store, &MockCodeList).unwrap();
    assert_eq!(entities.len(), 1);

    let code: EntityCode = "E12345".parse().unwrap();
    let entity = entities.get(&code).unwrap();
    assert_eq!(entity.entity_id.as_str(), "6254");
    assert_eq!(entity.display_name, "テスト株式会社");

    assert!(store.code_list_csv_path().as_std_path().exists());
    assert!(!store.code_list_zip_path().as_std_path().exists());
}
