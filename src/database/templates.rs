use anyhow::Result;
use sqlx::Row;

use super::Database;
use crate::models::{ConditionalDescription, DurationMode, Template, XmltvFlags};

fn parse_json_list<T: serde::de::DeserializeOwned>(raw: Option<String>) -> Vec<T> {
    raw.and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

impl Database {
    pub async fn get_template(&self, template_id: i64) -> Result<Option<Template>> {
        let row = sqlx::query("SELECT * FROM templates WHERE id = ?")
            .bind(template_id)
            .fetch_optional(self.pool())
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let flags: XmltvFlags = row
            .get::<Option<String>, _>("xmltv_flags")
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default();

        let conditional_descriptions: Vec<ConditionalDescription> =
            parse_json_list(row.get("conditional_descriptions"));
        let xmltv_categories: Vec<String> = parse_json_list(row.get("xmltv_categories"));

        Ok(Some(Template {
            id: row.get("id"),
            name: row.get("name"),
            title_format: row.get("title_format"),
            subtitle_format: row.get("subtitle_format"),
            channel_name_format: row.get("channel_name_format"),
            channel_logo_url: row.get("channel_logo_url"),
            program_art_url: row.get("program_art_url"),
            conditional_descriptions,
            pregame_enabled: row.get("pregame_enabled"),
            pregame_title: row.get("pregame_title"),
            pregame_subtitle: row.get("pregame_subtitle"),
            pregame_description: row.get("pregame_description"),
            pregame_art_url: row.get("pregame_art_url"),
            postgame_enabled: row.get("postgame_enabled"),
            postgame_title: row.get("postgame_title"),
            postgame_subtitle: row.get("postgame_subtitle"),
            postgame_description: row.get("postgame_description"),
            postgame_art_url: row.get("postgame_art_url"),
            postgame_conditional_enabled: row.get("postgame_conditional_enabled"),
            postgame_description_final: row.get("postgame_description_final"),
            postgame_description_not_final: row.get("postgame_description_not_final"),
            idle_title: row.get("idle_title"),
            idle_description: row.get("idle_description"),
            xmltv_flags: flags,
            xmltv_categories,
            categories_apply_to: row.get("categories_apply_to"),
            game_duration_mode: DurationMode::parse(&row.get::<String, _>("game_duration_mode")),
            game_duration_override: row.get("game_duration_override"),
        }))
    }
}
