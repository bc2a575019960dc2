//! Integration tests for the codec: files on disk through the parser, scanner and writer

mod common;

use common::{init_logging, TestLibrary};
use ldraw_core::{
    codec::{no_progress, read_source, scan_file, DocumentParser, PageWriter},
    model::{BfcCertification, Element, PageType, ReleaseStatus, Winding},
    LDrawError,
};

const OFFICIAL_PART: &str = "0 Brick  2 x  4\n\
                             0 Name: 3001.dat\n\
                             0 Author: James Jessiman\n\
                             0 !LDRAW_ORG Part UPDATE 2004-03\n\
                             0 !LICENSE Licensed under CC BY 4.0 : see CAreadme.txt\n\
                             \n\
                             0 BFC CERTIFY CCW\n\
                             \n\
                             0 !KEYWORDS classic, town\n\
                             \n\
                             0 !HISTORY 2002-05-07 [unknown] BFC Certification\n\
                             0 !HISTORY 2004-03-17 {Steve Bliss} Subfiled\n\
                             \n\
                             1 16 0 0 0 1 0 0 0 1 0 0 0 1 s\\3001s01.dat\n\
                             4 16 40 24 20 -40 24 20 -40 24 -20 40 24 -20\n";

const MULTI_PART: &str = "0 FILE house.mpd\n\
                          0 House\n\
                          1 4 0 0 0 1 0 0 0 1 0 0 0 1 wall.ldr\n\
                          1 1 0 -72 0 1 0 0 0 1 0 0 0 1 roof.ldr\n\
                          0 NOFILE\n\
                          \n\
                          0 FILE wall.ldr\n\
                          0 Wall\n\
                          1 16 0 0 0 1 0 0 0 1 0 0 0 1 3001.dat\n\
                          0 NOFILE\n\
                          0 FILE roof.ldr\n\
                          0 Roof\n\
                          1 16 0 0 0 1 0 0 0 1 0 0 0 1 3037.dat\n";

#[test]
fn official_part_header() {
    init_logging();
    let library = TestLibrary::new(1);
    let path = library.write(0, "parts/3001.dat", OFFICIAL_PART);
    let document = DocumentParser::parse_file(&path, &mut no_progress).unwrap();
    let page = document.main_page().unwrap();
    let header = page.header();
    assert_eq!(header.title.as_deref(), Some("Brick  2 x  4"));
    assert_eq!(header.page_type, PageType::Part);
    assert_eq!(
        header.status,
        ReleaseStatus::Released {
            update: Some("2004-03".to_string())
        }
    );
    assert_eq!(header.bfc, BfcCertification::Certified(Winding::Ccw));
    assert_eq!(header.history.len(), 2);
    assert_eq!(header.history[1].author, "Steve Bliss");
    drop(header);
    assert_eq!(page.category().as_deref(), Some("Brick"));
    assert_eq!(page.keywords(), vec!["classic", "town"]);
    assert!(page.diagnostics().is_empty());
    assert_eq!(page.references()[0].target_key(), "s\\3001s01.dat");
    assert!(page.steps()[0]
        .elements
        .iter()
        .any(|e| matches!(e, Element::Quad(_))));

    let summary = scan_file(&path).unwrap();
    assert_eq!(summary.title.as_deref(), Some("Brick  2 x  4"));
    assert_eq!(summary.page_type, PageType::Part);
    assert_eq!(summary.category.as_deref(), Some("Brick"));
}

#[test]
fn multi_part_files() {
    init_logging();
    let library = TestLibrary::new(1);
    let path = library.model("house.mpd", MULTI_PART);
    let document = DocumentParser::parse_file(&path, &mut no_progress).unwrap();
    let names: Vec<String> = document.pages().iter().map(|p| p.target_name()).collect();
    assert_eq!(names, ["house.mpd", "wall.ldr", "roof.ldr"]);
    assert!(document.find_page("WALL.LDR").is_some());

    let written = PageWriter::write_document(&document);
    let reparsed = DocumentParser::parse(&written, None, &mut no_progress).unwrap();
    let again: Vec<String> = reparsed.pages().iter().map(|p| p.target_name()).collect();
    assert_eq!(again, names);
    assert_eq!(PageWriter::write_document(&reparsed), written);
}

#[test]
fn duplicate_pages_are_rejected() {
    let source = "0 FILE a.ldr\n0 A\n0 FILE b.ldr\n0 B\n0 FILE A.LDR\n0 Again\n";
    match DocumentParser::parse(source, None, &mut no_progress) {
        Err(LDrawError::Syntax { line_number, .. }) => assert_eq!(line_number, 5),
        Err(e) => panic!("expected a syntax error, got {e}"),
        Ok(_) => panic!("duplicate page accepted"),
    }
}

#[test]
fn legacy_encodings_are_read() {
    let library = TestLibrary::new(1);
    let path = library.model("legacy.ldr", "");
    let mut bytes = b"\xef\xbb\xbf0 Stra\xdfe\n".to_vec();
    bytes.extend_from_slice(b"0 Author: M\xfcller\n");
    std::fs::write(&path, bytes).unwrap();

    let text = read_source(&path).unwrap();
    assert!(text.starts_with("0 Stra"));
    let document = DocumentParser::parse(&text, Some(&path), &mut no_progress).unwrap();
    let page = document.main_page().unwrap();
    assert!(page.title().unwrap().starts_with("Stra"));
    assert!(page.header().author.as_deref().unwrap().starts_with('M'));
}

#[test]
fn progress_is_reported_and_bounded() {
    let mut reports = Vec::new();
    let mut progress = |kind: &str, percent: u8| {
        reports.push((kind.to_string(), percent));
        true
    };
    DocumentParser::parse(MULTI_PART, None, &mut progress).unwrap();
    assert!(!reports.is_empty());
    assert!(reports.iter().all(|(_, percent)| *percent <= 50));
    assert!(reports.windows(2).all(|w| w[0].1 <= w[1].1));
    assert!(reports.iter().any(|(kind, _)| kind == "reference"));
}
