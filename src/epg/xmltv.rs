//! XMLTV document emission and parsing
//!
//! All times serialize as `YYYYMMDDHHMMSS +0000` in UTC. Output carries
//! the `<!DOCTYPE tv SYSTEM "xmltv.dtd">` doctype and emits every
//! `<channel>` before any `<programme>`, with no interleaving.

use chrono_tz::Tz;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event as XmlEvent};
use quick_xml::Reader;

use crate::errors::{AppError, AppResult};
use crate::models::{Programme, XmltvChannel};
use crate::utils::time::{format_programme_date, to_local};
use crate::utils::DateTimeParser;

const GENERATOR_NAME: &str = "Teamarr";

/// Serialize channels and programmes into a complete XMLTV document.
///
/// `banner` is an optional comment line embedded after the declaration
/// (the consolidator stamps the generation banner there).
pub fn write_xmltv(
    channels: &[XmltvChannel],
    programmes: &[Programme],
    timezone: Tz,
    banner: Option<&str>,
) -> AppResult<String> {
    let mut xml = String::with_capacity(1024);

    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    if let Some(banner) = banner {
        xml.push_str(&format!("<!--{banner}-->\n"));
    }
    xml.push_str("<!DOCTYPE tv SYSTEM \"xmltv.dtd\">\n");
    xml.push_str(&format!("<tv generator-info-name=\"{GENERATOR_NAME}\">\n"));

    // All channels first, then all programmes (XMLTV element order)
    for channel in channels {
        write_channel(&mut xml, channel);
    }
    for programme in programmes {
        write_programme(&mut xml, programme, timezone);
    }

    xml.push_str("</tv>\n");
    Ok(xml)
}

fn write_channel(xml: &mut String, channel: &XmltvChannel) {
    xml.push_str(&format!("  <channel id=\"{}\">\n", escape(&channel.id)));
    xml.push_str(&format!(
        "    <display-name>{}</display-name>\n",
        escape(&channel.name)
    ));
    if let Some(icon) = &channel.icon {
        if !icon.is_empty() {
            xml.push_str(&format!("    <icon src=\"{}\"/>\n", escape(icon)));
        }
    }
    xml.push_str("  </channel>\n");
}

fn write_programme(xml: &mut String, programme: &Programme, timezone: Tz) {
    xml.push_str(&format!(
        "  <programme start=\"{}\" stop=\"{}\" channel=\"{}\">\n",
        DateTimeParser::format_xmltv(&programme.start),
        DateTimeParser::format_xmltv(&programme.stop),
        escape(&programme.channel_id)
    ));

    xml.push_str(&format!(
        "    <title lang=\"en\">{}</title>\n",
        escape(&programme.title)
    ));
    if let Some(subtitle) = &programme.subtitle {
        xml.push_str(&format!(
            "    <sub-title lang=\"en\">{}</sub-title>\n",
            escape(subtitle)
        ));
    }
    if let Some(description) = &programme.description {
        xml.push_str(&format!(
            "    <desc lang=\"en\">{}</desc>\n",
            escape(description)
        ));
    }
    for category in &programme.categories {
        xml.push_str(&format!(
            "    <category lang=\"en\">{}</category>\n",
            escape(category)
        ));
    }

    // Programme date is the event's local calendar date
    xml.push_str(&format!(
        "    <date>{}</date>\n",
        format_programme_date(&to_local(programme.start, timezone))
    ));

    if let Some(icon) = &programme.icon {
        if !icon.is_empty() {
            xml.push_str(&format!("    <icon src=\"{}\"/>\n", escape(icon)));
        }
    }
    if let Some(episode_num) = &programme.episode_num {
        xml.push_str(&format!(
            "    <episode-num system=\"onscreen\">{}</episode-num>\n",
            escape(episode_num)
        ));
    }

    if programme.flag_new {
        xml.push_str("    <new/>\n");
    }
    if programme.flag_live {
        xml.push_str("    <live/>\n");
    }

    xml.push_str("  </programme>\n");
}

/// Parse an XMLTV document back into channels and programmes (used by
/// the consolidator to merge fragments).
pub fn parse_xmltv(content: &str) -> AppResult<(Vec<XmltvChannel>, Vec<Programme>)> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut channels = Vec::new();
    let mut programmes = Vec::new();

    let mut current_channel: Option<XmltvChannel> = None;
    let mut current_programme: Option<Programme> = None;
    let mut current_text_element: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(XmlEvent::Start(e)) | Ok(XmlEvent::Empty(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match name.as_str() {
                    "channel" => {
                        let id = attr(&e, "id").unwrap_or_default();
                        current_channel = Some(XmltvChannel {
                            id,
                            name: String::new(),
                            icon: None,
                        });
                    }
                    "programme" => {
                        let start = attr(&e, "start")
                            .and_then(|s| DateTimeParser::parse_xmltv(&s).ok())
                            .ok_or_else(|| {
                                AppError::parse("xmltv", "programme missing start time")
                            })?;
                        let stop = attr(&e, "stop")
                            .and_then(|s| DateTimeParser::parse_xmltv(&s).ok())
                            .ok_or_else(|| {
                                AppError::parse("xmltv", "programme missing stop time")
                            })?;
                        let channel = attr(&e, "channel").unwrap_or_default();
                        current_programme = Some(Programme::new(&channel, "", start, stop));
                    }
                    "icon" => {
                        let src = attr(&e, "src");
                        if let Some(programme) = current_programme.as_mut() {
                            programme.icon = src;
                        } else if let Some(channel) = current_channel.as_mut() {
                            channel.icon = src;
                        }
                    }
                    "new" => {
                        if let Some(programme) = current_programme.as_mut() {
                            programme.flag_new = true;
                        }
                    }
                    "live" => {
                        if let Some(programme) = current_programme.as_mut() {
                            programme.flag_live = true;
                        }
                    }
                    "display-name" | "title" | "sub-title" | "desc" | "category"
                    | "episode-num" => {
                        current_text_element = Some(name);
                    }
                    _ => {}
                }
            }
            Ok(XmlEvent::Text(text)) => {
                let value = text
                    .unescape()
                    .map_err(|e| AppError::parse("xmltv", e.to_string()))?
                    .to_string();
                match current_text_element.as_deref() {
                    Some("display-name") => {
                        if let Some(channel) = current_channel.as_mut() {
                            channel.name = value;
                        }
                    }
                    Some("title") => {
                        if let Some(programme) = current_programme.as_mut() {
                            programme.title = value;
                        }
                    }
                    Some("sub-title") => {
                        if let Some(programme) = current_programme.as_mut() {
                            programme.subtitle = Some(value);
                        }
                    }
                    Some("desc") => {
                        if let Some(programme) = current_programme.as_mut() {
                            programme.description = Some(value);
                        }
                    }
                    Some("category") => {
                        if let Some(programme) = current_programme.as_mut() {
                            programme.categories.push(value);
                        }
                    }
                    Some("episode-num") => {
                        if let Some(programme) = current_programme.as_mut() {
                            programme.episode_num = Some(value);
                        }
                    }
                    _ => {}
                }
            }
            Ok(XmlEvent::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match name.as_str() {
                    "channel" => {
                        if let Some(channel) = current_channel.take() {
                            channels.push(channel);
                        }
                    }
                    "programme" => {
                        if let Some(programme) = current_programme.take() {
                            programmes.push(programme);
                        }
                    }
                    _ => {
                        current_text_element = None;
                    }
                }
            }
            Ok(XmlEvent::Eof) => break,
            Err(e) => return Err(AppError::parse("xmltv", e.to_string())),
            _ => {}
        }
    }

    Ok((channels, programmes))
}

fn attr(element: &BytesStart, name: &str) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|a| a.key.as_ref() == name.as_bytes())
        .and_then(|a| a.unescape_value().ok().map(|v| v.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::time::parse_timezone;
    use chrono::{TimeZone, Utc};

    fn sample_data() -> (Vec<XmltvChannel>, Vec<Programme>) {
        let channels = vec![XmltvChannel {
            id: "teamarr-event-401547".to_string(),
            name: "Giants @ Cowboys".to_string(),
            icon: Some("https://a.espncdn.com/dal.png".to_string()),
        }];

        let mut game = Programme::new(
            "teamarr-event-401547",
            "New York Giants @ Dallas Cowboys",
            Utc.with_ymd_and_hms(2025, 12, 14, 18, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 12, 14, 21, 30, 0).unwrap(),
        );
        game.description = Some("Week 15 showdown".to_string());
        game.subtitle = Some("AT&T Stadium".to_string());
        game.categories = vec!["Sports".to_string(), "Football".to_string()];
        game.flag_live = true;

        (channels, vec![game])
    }

    #[test]
    fn test_write_contains_doctype_and_utc_times() {
        let (channels, programmes) = sample_data();
        let xml = write_xmltv(&channels, &programmes, parse_timezone("America/New_York"), None)
            .unwrap();

        assert!(xml.contains("<!DOCTYPE tv SYSTEM \"xmltv.dtd\">"));
        assert!(xml.contains("start=\"20251214180000 +0000\""));
        assert!(xml.contains("stop=\"20251214213000 +0000\""));
        assert!(xml.contains("<live/>"));
        // Local calendar date: 1pm EST on Dec 14
        assert!(xml.contains("<date>20251214</date>"));
    }

    #[test]
    fn test_channels_precede_programmes() {
        let (channels, programmes) = sample_data();
        let xml = write_xmltv(&channels, &programmes, parse_timezone("America/New_York"), None)
            .unwrap();
        let channel_pos = xml.find("<channel").unwrap();
        let programme_pos = xml.find("<programme").unwrap();
        assert!(channel_pos < programme_pos);
    }

    #[test]
    fn test_round_trip_preserves_identity_tuples() {
        let (channels, programmes) = sample_data();
        let timezone = parse_timezone("America/New_York");
        let xml = write_xmltv(&channels, &programmes, timezone, None).unwrap();

        let (parsed_channels, parsed_programmes) = parse_xmltv(&xml).unwrap();
        let rewritten = write_xmltv(&parsed_channels, &parsed_programmes, timezone, None).unwrap();
        let (again_channels, again_programmes) = parse_xmltv(&rewritten).unwrap();

        assert_eq!(parsed_channels.len(), again_channels.len());
        assert_eq!(parsed_programmes.len(), again_programmes.len());
        for (a, b) in parsed_programmes.iter().zip(again_programmes.iter()) {
            assert_eq!(a.channel_id, b.channel_id);
            assert_eq!(a.start, b.start);
            assert_eq!(a.stop, b.stop);
            assert_eq!(a.title, b.title);
        }
    }

    #[test]
    fn test_parse_recovers_fields() {
        let (channels, programmes) = sample_data();
        let xml = write_xmltv(&channels, &programmes, parse_timezone("America/New_York"), None)
            .unwrap();
        let (parsed_channels, parsed_programmes) = parse_xmltv(&xml).unwrap();

        assert_eq!(parsed_channels.len(), 1);
        assert_eq!(parsed_channels[0].id, "teamarr-event-401547");
        assert_eq!(parsed_channels[0].name, "Giants @ Cowboys");
        assert!(parsed_channels[0].icon.is_some());

        assert_eq!(parsed_programmes.len(), 1);
        let programme = &parsed_programmes[0];
        assert_eq!(programme.title, "New York Giants @ Dallas Cowboys");
        assert_eq!(programme.subtitle.as_deref(), Some("AT&T Stadium"));
        assert_eq!(programme.categories, vec!["Sports", "Football"]);
        assert!(programme.flag_live);
        assert!(!programme.flag_new);
    }

    #[test]
    fn test_banner_comment() {
        let (channels, programmes) = sample_data();
        let xml = write_xmltv(
            &channels,
            &programmes,
            parse_timezone("America/New_York"),
            Some(" Generated by Teamarr "),
        )
        .unwrap();
        assert!(xml.contains("<!-- Generated by Teamarr -->"));
    }
}
