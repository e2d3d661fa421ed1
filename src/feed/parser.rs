use crate::types::Item;
use feed_rs::model::{Entry, Link, Text};
use feed_rs::parser;
use thiserror::Error;

/// Separator between source title and entry title in synthesized identities.
const GUID_SEPARATOR: &str = "-";

#[derive(Debug, Error)]
#[error("{0}")]
pub struct ParseError(#[from] parser::ParseFeedError);

/// Parse an RSS 2.0 or Atom document into normalized [`Item`]s.
///
/// Identity (`guid`) is assigned in this order:
///
/// 1. the entry's own id (`<guid>` / `<id>`), trimmed
/// 2. the entry's first link
/// 3. `"<source title>-<entry title>"`, where the source title is the feed's
///    `<title>`, or `source_name` if the feed has none
///
/// The third form is lossy: two link-less entries with the same title in the
/// same feed get the same guid.
pub fn parse_items(bytes: &[u8], source_name: &str) -> Result<Vec<Item>, ParseError> {
    // feed-rs synthesizes ids for entries that lack one; suppress that so a
    // missing id stays observable.
    let feed = parser::Builder::new()
        .id_generator(|_: &[Link], _: &Option<Text>, _: Option<&str>| String::new())
        .build()
        .parse(bytes)?;

    let source_title = feed
        .title
        .map(|t| t.content.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| source_name.to_string());

    Ok(feed
        .entries
        .into_iter()
        .map(|entry| to_item(entry, source_name, &source_title))
        .collect())
}

fn to_item(entry: Entry, source_name: &str, source_title: &str) -> Item {
    let link = entry
        .links
        .first()
        .map(|l| l.href.trim().to_string())
        .unwrap_or_default();
    let title = entry
        .title
        .map(|t| t.content.trim().to_string())
        .unwrap_or_default();
    let guid = assign_guid(&entry.id, &link, source_title, &title);

    Item {
        source: source_name.to_string(),
        guid,
        title,
        link,
        description: entry.summary.map(|s| s.content).unwrap_or_default(),
        content: entry.content.and_then(|c| c.body),
        author: entry
            .authors
            .into_iter()
            .next()
            .map(|p| p.name)
            .unwrap_or_default(),
        published: entry.published.or(entry.updated),
    }
}

pub(crate) fn assign_guid(id: &str, link: &str, source_title: &str, title: &str) -> String {
    let id = id.trim();
    if !id.is_empty() {
        return id.to_string();
    }
    if !link.is_empty() {
        return link.to_string();
    }
    format!("{source_title}{GUID_SEPARATOR}{title}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn rss(channel_title: Option<&str>, items: &str) -> String {
        let title = channel_title
            .map(|t| format!("<title>{t}</title>"))
            .unwrap_or_default();
        format!(
            r#"<?xml version="1.0"?>
<rss version="2.0"><channel>{title}<link>https://example.com</link><description>d</description>
{items}
</channel></rss>"#
        )
    }

    #[test]
    fn test_guid_prefers_feed_id() {
        let xml = rss(
            Some("Blog"),
            "<item><guid>abc-123</guid><title>T</title><link>https://example.com/a</link></item>",
        );
        let items = parse_items(xml.as_bytes(), "blog").unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].guid, "abc-123");
        assert_eq!(items[0].source, "blog");
    }

    #[test]
    fn test_guid_falls_back_to_link() {
        let xml = rss(
            Some("Blog"),
            "<item><title>T</title><link>https://example.com/a</link></item>",
        );
        let items = parse_items(xml.as_bytes(), "blog").unwrap();
        assert_eq!(items[0].guid, "https://example.com/a");
        assert_eq!(items[0].link, "https://example.com/a");
    }

    #[test]
    fn test_guid_synthesized_from_titles() {
        let xml = rss(Some("Blog"), "<item><title>Hello</title></item>");
        let items = parse_items(xml.as_bytes(), "blog").unwrap();
        assert_eq!(items[0].guid, "Blog-Hello");
    }

    #[test]
    fn test_guid_synthesized_uses_source_name_without_feed_title() {
        let xml = rss(None, "<item><title>Hello</title></item>");
        let items = parse_items(xml.as_bytes(), "blog").unwrap();
        assert_eq!(items[0].guid, "blog-Hello");
    }

    #[test]
    fn test_synthesized_guid_is_stable() {
        let xml = rss(Some("Blog"), "<item><title>Same</title></item>");
        let first = parse_items(xml.as_bytes(), "blog").unwrap();
        let second = parse_items(xml.as_bytes(), "blog").unwrap();
        assert_eq!(first[0].guid, second[0].guid);
    }

    #[test]
    fn test_atom_entry_fields() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Blog</title>
  <id>urn:feed</id>
  <updated>2024-01-02T00:00:00Z</updated>
  <entry>
    <id>urn:entry:1</id>
    <title>Entry One</title>
    <link href="https://example.com/one"/>
    <updated>2024-01-02T03:04:05Z</updated>
    <author><name>Ada</name></author>
    <summary>Short</summary>
    <content type="html">&lt;p&gt;Long&lt;/p&gt;</content>
  </entry>
</feed>"#;
        let items = parse_items(xml.as_bytes(), "atom").unwrap();
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.guid, "urn:entry:1");
        assert_eq!(item.title, "Entry One");
        assert_eq!(item.author, "Ada");
        assert_eq!(item.description, "Short");
        assert!(item.content.as_deref().unwrap_or_default().contains("Long"));
        // No <published>, so updated is used
        assert_eq!(
            item.published.map(|p| p.to_rfc3339()),
            Some("2024-01-02T03:04:05+00:00".to_string())
        );
    }

    #[test]
    fn test_missing_dates_are_none() {
        let xml = rss(Some("Blog"), "<item><guid>1</guid><title>T</title></item>");
        let items = parse_items(xml.as_bytes(), "blog").unwrap();
        assert!(items[0].published.is_none());
    }

    #[test]
    fn test_invalid_body_is_parse_error() {
        assert!(parse_items(b"<not valid xml", "blog").is_err());
        assert!(parse_items(b"plain text", "blog").is_err());
    }

    #[test]
    fn test_empty_channel() {
        let xml = rss(Some("Blog"), "");
        assert!(parse_items(xml.as_bytes(), "blog").unwrap().is_empty());
    }

    proptest! {
        #[test]
        fn prop_feed_id_is_verbatim(id in "[A-Za-z0-9:_.]{1,40}", title in "[A-Za-z ]{0,20}") {
            let xml = rss(
                Some("Blog"),
                &format!("<item><guid>{id}</guid><title>{title}</title><link>https://example.com/x</link></item>"),
            );
            let items = parse_items(xml.as_bytes(), "blog").unwrap();
            prop_assert_eq!(&items[0].guid, &id);
        }

        #[test]
        fn prop_assign_guid_order(
            id in "[a-z0-9]{0,8}",
            link in "(https://example\\.com/[a-z]{1,8})?",
            source in "[A-Za-z]{1,8}",
            title in "[A-Za-z]{0,8}",
        ) {
            let guid = assign_guid(&id, &link, &source, &title);
            if !id.is_empty() {
                prop_assert_eq!(guid, id);
            } else if !link.is_empty() {
                prop_assert_eq!(guid, link);
            } else {
                prop_assert_eq!(guid, format!("{}-{}", source, title));
            }
        }
    }
}
