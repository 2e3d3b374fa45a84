use serftxt::{DefaultSerfTxt, SerfTxt, TxtItem, TxtNode};
use std::io::Write;
use tempfile::NamedTempFile;

fn parse_file(data: &str) -> TxtNode {
    let mut file = NamedTempFile::new().expect("TempFile");
    write!(file, "{}", data).expect("Write");
    let tokens = DefaultSerfTxt::open_txt(file.path()).expect("Tokenize");
    DefaultSerfTxt::parse(tokens).expect("Parse")
}

#[test]
fn test_repeated_blocks() {
    let data = r#"
        serf = { index = 1 state = null }
        serf = { index = 2 state = lost field_b = 1 }
    "#;
    let root = parse_file(data);
    let serfs: Vec<_> = root.get_all("serf").collect();
    assert_eq!(serfs.len(), 2);
    assert_eq!(serfs[1].get("field_b").and_then(TxtNode::as_int), Some(1));
}

#[test]
fn test_lists() {
    let data = r#"
        nums = { 1 2 3 }
        names = { "a" b }
    "#;
    let root = parse_file(data);
    let nums: Vec<i64> = root
        .get("nums")
        .unwrap()
        .children
        .iter()
        .filter_map(TxtNode::as_int)
        .collect();
    assert_eq!(nums, vec![1, 2, 3]);
    let names = root.get("names").unwrap();
    assert_eq!(names.children[0].entry, TxtItem::StringValue("a".into()));
    assert_eq!(names.children[1].entry, TxtItem::Identifier("b".into()));
}

#[test]
fn test_nested() {
    let data = r#"
        game = {
            tick = 1200
            serf = {
                index = 9
            }
        }
    "#;
    let root = parse_file(data);
    let game = root.get("game").unwrap();
    assert_eq!(game.get("tick").and_then(TxtNode::as_int), Some(1200));
    let serf = game.get("serf").unwrap();
    assert_eq!(serf.get("index").and_then(TxtNode::as_int), Some(9));
    assert_eq!(root.node_count(), 13);
}

#[test]
fn test_missing_rhs() {
    assert!(DefaultSerfTxt::parse_str("a = }").is_err());
}
