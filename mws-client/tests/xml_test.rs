use mws_client::MwsError;
use mws_client::xml::{error_details, parse_document, rewrite_namespaces};

const STATUS: &str = r#"<?xml version="1.0"?>
<GetFeedSubmissionListResponse xmlns="http://mws.amazonaws.com/doc/2009-01-01/" xmlns:x="urn:x">
  <GetFeedSubmissionListResult>
    <FeedSubmissionInfo><FeedSubmissionId>1</FeedSubmissionId><FeedProcessingStatus>_DONE_</FeedProcessingStatus></FeedSubmissionInfo>
    <FeedSubmissionInfo><FeedSubmissionId>2</FeedSubmissionId><FeedProcessingStatus> _IN_PROGRESS_ </FeedProcessingStatus></FeedSubmissionInfo>
    <Note><![CDATA[a < b]]></Note>
    <Empty/>
  </GetFeedSubmissionListResult>
</GetFeedSubmissionListResponse>"#;

#[test]
fn test_namespace_declarations_are_rewritten() {
    assert_eq!(rewrite_namespaces(r#"<a xmlns="u" xmlns:b="v"/>"#), r#"<a ns="u" ns:b="v"/>"#);
}

#[test]
fn test_tree_navigation() {
    let document = parse_document(STATUS).unwrap();
    assert_eq!(document.name, "GetFeedSubmissionListResponse");
    assert_eq!(document.attr("ns"), Some("http://mws.amazonaws.com/doc/2009-01-01/"));

    let infos = document.find_all(&["GetFeedSubmissionListResult", "FeedSubmissionInfo"]);
    assert_eq!(infos.len(), 2);
    assert_eq!(infos[1].text_at(&["FeedProcessingStatus"]).as_deref(), Some("_IN_PROGRESS_"));
    assert_eq!(
        document.text_at(&["GetFeedSubmissionListResult", "FeedSubmissionInfo", "FeedSubmissionId"]).as_deref(),
        Some("1")
    );
    assert_eq!(document.text_at(&["GetFeedSubmissionListResult", "Note"]).as_deref(), Some("a < b"));
    assert!(document.find(&["GetFeedSubmissionListResult", "Empty"]).is_some());
    assert_eq!(document.text_at(&["GetFeedSubmissionListResult", "Empty"]), None);
    assert!(document.find_all(&["Missing", "FeedSubmissionInfo"]).is_empty());
}

#[test]
fn test_error_details() {
    let wrapped = "<ErrorResponse xmlns=\"http://mws.amazonaws.com/doc/2009-01-01/\"><Error><Type>Sender</Type>\
                   <Code>InvalidParameterValue</Code><Message>Bad id</Message></Error></ErrorResponse>";
    assert_eq!(
        error_details(wrapped),
        (Some("InvalidParameterValue".to_string()), Some("Bad id".to_string()))
    );
    let bare = "<Error><Code>AccessDenied</Code></Error>";
    assert_eq!(error_details(bare), (Some("AccessDenied".to_string()), None));
    assert_eq!(error_details("<Ok/>"), (None, None));
    assert_eq!(error_details("plain text"), (None, None));
}

#[test]
fn test_malformed_documents() {
    match parse_document("<a>\n<b>\n</c></a>") {
        Err(MwsError::XmlParse { line, .. }) => assert_eq!(line, 3),
        other => panic!("Unexpected outcome: {:?}", other),
    }
    assert!(matches!(parse_document(""), Err(MwsError::XmlParse { .. })));
    assert!(matches!(parse_document("<a><b>"), Err(MwsError::XmlParse { .. })));
}
