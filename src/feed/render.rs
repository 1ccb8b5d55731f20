use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Write;

use crate::config::ChannelConfig;
use crate::storage::Episode;

const ITUNES_NS: &str = "http://www.itunes.com/dtds/podcast-1.0.dtd";
const ATOM_NS: &str = "http://www.w3.org/2005/Atom";
const GOOGLEPLAY_NS: &str = "http://www.google.com/schemas/play-podcasts/1.0";

/// Formats an item `pubDate` (RFC 822 style, always GMT).
pub fn format_pub_date(date: &DateTime<Utc>) -> String {
    date.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Renders the podcast feed as a UTF-8 string.
///
/// Items keep the order of `episodes`; pass the catalog's newest-first
/// listing to get a conventional feed.
pub fn render_feed(episodes: &[Episode], channel: &ChannelConfig) -> Result<String> {
    let mut buf = Vec::new();
    write_feed(&mut buf, episodes, channel)?;
    String::from_utf8(buf).context("Generated feed contains invalid UTF-8")
}

/// Writes the RSS 2.0 document (with iTunes, Google Play and Atom
/// extensions) for `episodes` to `out`.
pub fn write_feed<W: Write>(out: W, episodes: &[Episode], channel: &ChannelConfig) -> Result<()> {
    let mut writer = Writer::new_with_indent(out, b' ', 2);

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .context("Failed to write XML declaration")?;

    let mut rss = BytesStart::new("rss");
    rss.push_attribute(("version", "2.0"));
    rss.push_attribute(("xmlns:itunes", ITUNES_NS));
    rss.push_attribute(("xmlns:atom", ATOM_NS));
    rss.push_attribute(("xmlns:googleplay", GOOGLEPLAY_NS));
    writer
        .write_event(Event::Start(rss))
        .context("Failed to write rss element")?;
    start(&mut writer, "channel")?;

    write_channel_header(&mut writer, channel)?;
    for episode in episodes {
        write_item(&mut writer, episode)?;
    }

    end(&mut writer, "channel")?;
    end(&mut writer, "rss")?;

    writer
        .into_inner()
        .flush()
        .context("Failed to flush feed output")?;
    Ok(())
}

fn write_channel_header<W: Write>(writer: &mut Writer<W>, channel: &ChannelConfig) -> Result<()> {
    text_element(writer, "title", &channel.title)?;
    text_element(writer, "link", &channel.link)?;
    text_element(writer, "language", &channel.language)?;
    text_element(writer, "copyright", &channel.copyright)?;

    let mut self_link = BytesStart::new("atom:link");
    self_link.push_attribute(("href", channel.self_link.as_str()));
    self_link.push_attribute(("rel", "self"));
    self_link.push_attribute(("type", "application/rss+xml"));
    empty(writer, self_link)?;

    text_element(writer, "itunes:subtitle", &channel.subtitle)?;
    text_element(writer, "itunes:author", &channel.author)?;
    text_element(writer, "googleplay:author", &channel.author)?;
    text_element(writer, "itunes:summary", &channel.summary)?;
    text_element(writer, "description", &channel.description)?;

    start(writer, "itunes:owner")?;
    text_element(writer, "itunes:name", &channel.owner_name)?;
    text_element(writer, "itunes:email", &channel.owner_email)?;
    end(writer, "itunes:owner")?;

    empty(writer, with_attr("itunes:image", "href", &channel.image))?;
    empty(writer, with_attr("googleplay:image", "href", &channel.image))?;
    empty(writer, with_attr("itunes:category", "text", &channel.category))?;
    empty(writer, with_attr("googleplay:category", "text", &channel.category))?;
    text_element(writer, "itunes:explicit", &channel.explicit)?;

    Ok(())
}

fn write_item<W: Write>(writer: &mut Writer<W>, episode: &Episode) -> Result<()> {
    start(writer, "item")?;

    text_element(writer, "title", &episode.title)?;
    text_element(writer, "itunes:author", &episode.author)?;
    text_element(writer, "itunes:subtitle", &episode.subtitle)?;
    text_element(writer, "itunes:summary", &episode.summary)?;
    empty(writer, with_attr("itunes:image", "href", &episode.image_url))?;

    let length = episode.size_bytes.to_string();
    let mut enclosure = BytesStart::new("enclosure");
    enclosure.push_attribute(("url", episode.url.as_str()));
    enclosure.push_attribute(("length", length.as_str()));
    enclosure.push_attribute(("type", episode.mime_type.as_str()));
    empty(writer, enclosure)?;

    text_element(writer, "guid", &episode.url)?;
    text_element(writer, "pubDate", &format_pub_date(&episode.publish_date))?;
    text_element(writer, "description", &episode.description)?;
    text_element(
        writer,
        "itunes:duration",
        episode.duration.as_deref().unwrap_or(""),
    )?;
    text_element(writer, "itunes:explicit", &episode.explicitness)?;

    end(writer, "item")
}

fn with_attr<'a>(name: &'a str, key: &'a str, value: &'a str) -> BytesStart<'a> {
    let mut element = BytesStart::new(name);
    element.push_attribute((key, value));
    element
}

/// `<name>text</name>`; the text is escaped, and an empty string still
/// produces a start/end pair on one line.
fn text_element<W: Write>(writer: &mut Writer<W>, name: &str, text: &str) -> Result<()> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .with_context(|| format!("Failed to write {name} element"))?;
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .with_context(|| format!("Failed to write {name} text"))?;
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .with_context(|| format!("Failed to write {name} end"))?;
    Ok(())
}

fn start<W: Write>(writer: &mut Writer<W>, name: &str) -> Result<()> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .with_context(|| format!("Failed to write {name} element"))?;
    Ok(())
}

fn end<W: Write>(writer: &mut Writer<W>, name: &str) -> Result<()> {
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .with_context(|| format!("Failed to write {name} end"))?;
    Ok(())
}

fn empty<W: Write>(writer: &mut Writer<W>, element: BytesStart<'_>) -> Result<()> {
    writer
        .write_event(Event::Empty(element))
        .context("Failed to write empty element")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn episode(url: &str, day: u32) -> Episode {
        Episode {
            publish_date: Utc.with_ymd_and_hms(2020, 1, day, 9, 30, 0).unwrap(),
            size_bytes: 1000 + u64::from(day),
            title: format!("Show ({day:02}-01-2020)"),
            author: "Radio Record".to_string(),
            subtitle: String::new(),
            summary: String::new(),
            description: String::new(),
            image_url: "http://example.com/cover.jpg".to_string(),
            url: url.to_string(),
            mime_type: "audio/mpeg".to_string(),
            duration: None,
            explicitness: "clean".to_string(),
        }
    }

    #[test]
    fn test_format_pub_date() {
        let date = Utc.with_ymd_and_hms(2018, 1, 8, 10, 0, 0).unwrap();
        assert_eq!(format_pub_date(&date), "Mon, 08 Jan 2018 10:00:00 GMT");
    }

    #[test]
    fn test_items_keep_input_order() {
        let episodes = vec![
            episode("http://example.com/2020-01-02.mp3", 2),
            episode("http://example.com/2020-01-01.mp3", 1),
        ];
        let xml = render_feed(&episodes, &ChannelConfig::default()).unwrap();

        let second = xml.find("2020-01-02.mp3").unwrap();
        let first = xml.find("2020-01-01.mp3").unwrap();
        assert!(second < first);
        assert_eq!(xml.matches("<item>").count(), 2);
    }

    #[test]
    fn test_item_fields() {
        let mut ep = episode("http://example.com/a.mp3", 2);
        ep.duration = Some("1:02:03".to_string());
        let xml = render_feed(&[ep], &ChannelConfig::default()).unwrap();

        assert!(xml.contains(
            r#"<enclosure url="http://example.com/a.mp3" length="1002" type="audio/mpeg"/>"#
        ));
        assert!(xml.contains("<guid>http://example.com/a.mp3</guid>"));
        assert!(xml.contains("<pubDate>Thu, 02 Jan 2020 09:30:00 GMT</pubDate>"));
        assert!(xml.contains("<itunes:duration>1:02:03</itunes:duration>"));
        assert!(xml.contains(r#"<itunes:image href="http://example.com/cover.jpg"/>"#));
        assert!(xml.contains("<itunes:explicit>clean</itunes:explicit>"));
    }

    #[test]
    fn test_missing_duration_renders_empty_element() {
        let xml = render_feed(
            &[episode("http://example.com/a.mp3", 1)],
            &ChannelConfig::default(),
        )
        .unwrap();
        assert!(xml.contains("<itunes:duration></itunes:duration>"));
    }

    #[test]
    fn test_channel_metadata() {
        let xml = render_feed(&[], &ChannelConfig::default()).unwrap();
        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(xml.contains(r#"xmlns:itunes="http://www.itunes.com/dtds/podcast-1.0.dtd""#));
        assert!(xml.contains("<title>Radio Record / Кремов и Хрусталев</title>"));
        assert!(xml.contains("<language>ru-ru</language>"));
        assert!(xml.contains("<itunes:name>Marsel Markhabulin</itunes:name>"));
        assert!(xml.contains(r#"<itunes:category text="Comedy"/>"#));
        assert!(xml.contains(
            r#"<atom:link href="http://www.radiorecord.ru/rss.xml" rel="self" type="application/rss+xml"/>"#
        ));
        assert!(!xml.contains("<item>"));
    }

    #[test]
    fn test_text_is_escaped() {
        let mut ep = episode("http://example.com/a.mp3?x=1&y=2", 1);
        ep.title = "Rock & <Roll>".to_string();
        let xml = render_feed(&[ep], &ChannelConfig::default()).unwrap();

        assert!(xml.contains("<title>Rock &amp; &lt;Roll&gt;</title>"));
        assert!(xml.contains(r#"url="http://example.com/a.mp3?x=1&amp;y=2""#));
    }

    #[test]
    fn test_rendered_feed_parses_back() {
        let episodes = vec![
            episode("http://example.com/2020-01-02.mp3", 2),
            episode("http://example.com/2020-01-01.mp3", 1),
        ];
        let xml = render_feed(&episodes, &ChannelConfig::default()).unwrap();
        let feed = feed_rs::parser::parse(xml.as_bytes()).unwrap();

        assert_eq!(feed.entries.len(), 2);
        let titles: Vec<String> = feed
            .entries
            .iter()
            .filter_map(|e| e.title.as_ref().map(|t| t.content.clone()))
            .collect();
        assert_eq!(titles, vec!["Show (02-01-2020)", "Show (01-01-2020)"]);
    }
}
