//! Source-specific record normalization into the canonical [`Tender`] shape.
//!
//! Each source gets a data-driven [`FieldTable`] of ordered candidate keys;
//! the normalizer walks the table, repairs encoding damage, parses dates and
//! amounts tolerantly, and fills in per-source defaults (entity, location,
//! original URL) where the feed is silent.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use tendex_core::{
    synthesize_tender_id, QualityScores, RawRecord, Source, Tender, TenderMeta,
};
use tracing::debug;

const TITLE_MAX_CHARS: usize = 150;
const SEMANTIC_TEXT_MAX_CHARS: usize = 8000;

const SPANISH_MONTHS: [&str; 12] = [
    "enero",
    "febrero",
    "marzo",
    "abril",
    "mayo",
    "junio",
    "julio",
    "agosto",
    "septiembre",
    "octubre",
    "noviembre",
    "diciembre",
];

// Used to locate a state mention inside free text scraped from ComprasMX rows.
const MEXICAN_STATES: [&str; 32] = [
    "aguascalientes",
    "baja california",
    "baja california sur",
    "campeche",
    "chiapas",
    "chihuahua",
    "ciudad de méxico",
    "coahuila",
    "colima",
    "durango",
    "estado de méxico",
    "guanajuato",
    "guerrero",
    "hidalgo",
    "jalisco",
    "michoacán",
    "morelos",
    "nayarit",
    "nuevo león",
    "oaxaca",
    "puebla",
    "querétaro",
    "quintana roo",
    "san luis potosí",
    "sinaloa",
    "sonora",
    "tabasco",
    "tamaulipas",
    "tlaxcala",
    "veracruz",
    "yucatán",
    "zacatecas",
];

/// Ordered candidate keys for each canonical field of one source's feed.
#[derive(Debug, Clone, Copy)]
pub struct FieldTable {
    pub id: &'static [&'static str],
    pub title: &'static [&'static str],
    pub description: &'static [&'static str],
    pub entity: &'static [&'static str],
    pub amount: &'static [&'static str],
    pub catalog_date: &'static [&'static str],
    pub opening_date: &'static [&'static str],
    pub procurement_type: &'static [&'static str],
    pub url: &'static [&'static str],
}

const TIANGUIS_CDMX_FIELDS: FieldTable = FieldTable {
    id: &["planning_id", "id", "reference_number"],
    title: &["name", "title", "planning_name"],
    description: &["description", "details", "planning_description"],
    entity: &["entity", "dependencia", "organization", "institution"],
    amount: &["estimated_amount", "budget", "amount", "estimated_value"],
    catalog_date: &["planning_date", "publication_date", "created_at"],
    opening_date: &["opening_date", "submission_deadline", "deadline"],
    procurement_type: &["hiring_method_name", "procurement_type", "method", "type"],
    url: &["url", "link", "source_url"],
};

const LICITA_YA_FIELDS: FieldTable = FieldTable {
    id: &["id", "tender_id", "reference"],
    title: &["title", "name", "subject"],
    description: &["description", "details", "summary"],
    entity: &["entity", "institution", "buyer"],
    amount: &["amount", "value", "budget"],
    catalog_date: &["date", "publication_date", "created_date"],
    opening_date: &["deadline", "closing_date", "due_date"],
    procurement_type: &["type", "procurement_type", "category"],
    url: &["url", "link", "source_url"],
};

const COMPRAS_MX_FIELDS: FieldTable = FieldTable {
    id: &["tender_id", "numero_referencia"],
    title: &["titulo", "descripcion"],
    description: &["descripcion", "all_text"],
    entity: &["entidad"],
    amount: &["valor_estimado"],
    catalog_date: &["fecha_apertura", "fecha_catalogacion"],
    opening_date: &["fecha_apertura"],
    procurement_type: &["tipo_proceso"],
    url: &["url", "url_original"],
};

pub fn field_table(source: Source) -> FieldTable {
    match source {
        Source::TianguisCdmx => TIANGUIS_CDMX_FIELDS,
        Source::LicitaYa => LICITA_YA_FIELDS,
        Source::ComprasMx => COMPRAS_MX_FIELDS,
    }
}

/// Per-source reliability base scores. Pluggable so an operator can lower a
/// feed's score after observing drift, without touching the normalizer.
#[derive(Debug, Clone, Copy)]
pub struct ReliabilityScores {
    pub tianguis_cdmx: f64,
    pub licita_ya: f64,
    pub compras_mx: f64,
}

impl Default for ReliabilityScores {
    fn default() -> Self {
        Self {
            tianguis_cdmx: 0.95,
            licita_ya: 0.9,
            compras_mx: 0.8,
        }
    }
}

impl ReliabilityScores {
    fn base(&self, source: Source) -> f64 {
        match source {
            Source::TianguisCdmx => self.tianguis_cdmx,
            Source::LicitaYa => self.licita_ya,
            Source::ComprasMx => self.compras_mx,
        }
    }
}

/// A normalized tender plus any raw field text that refused to parse.
///
/// Unparsed leftovers are carried to the validator so the recovery engine can
/// attempt a digit-extraction re-parse before the field is abandoned.
#[derive(Debug, Clone)]
pub struct Normalized {
    pub tender: Tender,
    pub unparsed_catalog_date: Option<String>,
    pub unparsed_opening_date: Option<String>,
    pub unparsed_amount: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    reliability: ReliabilityScores,
}

impl Normalizer {
    pub fn new(reliability: ReliabilityScores) -> Self {
        Self { reliability }
    }

    /// Converts one raw record into a canonical tender.
    ///
    /// Returns `None` only for records with no usable content: no entity, no
    /// description, and a title under 10 characters.
    pub fn normalize(
        &self,
        source: Source,
        raw: &RawRecord,
        extracted_at: DateTime<Utc>,
    ) -> Option<Normalized> {
        let table = field_table(source);

        let entity_raw = scalar_string(raw, table.entity).map(|s| fix_encoding(&s));
        let description = scalar_string(raw, table.description)
            .map(|s| fix_encoding(&s))
            .unwrap_or_default();
        let title_raw = scalar_string(raw, table.title).map(|s| fix_encoding(&s));

        let entity_present = entity_raw.as_deref().is_some_and(|e| !e.is_empty());
        let title_len = title_raw.as_deref().map(|t| t.chars().count()).unwrap_or(0);
        if !entity_present && description.is_empty() && title_len < 10 {
            debug!(source = %source, "dropping record with no usable content");
            return None;
        }

        let (catalog_date, unparsed_catalog_date) = take_date(raw, table.catalog_date);
        let (opening_date, unparsed_opening_date) = take_date(raw, table.opening_date);
        let (estimated_amount, unparsed_amount) = take_amount(raw, table.amount);

        let procurement_type = scalar_string(raw, table.procurement_type)
            .map(|s| fix_encoding(&s))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "Licitación".to_string());

        let entity = entity_raw
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| default_entity(source).to_string());

        let (region, city) = resolve_location(source, raw, &description);

        let tender_id = scalar_string(raw, table.id)
            .filter(|id| !id.trim().is_empty())
            .map(|id| id.trim().to_string())
            .unwrap_or_else(|| {
                synthesize_tender_id(
                    source,
                    title_raw.as_deref().unwrap_or(""),
                    &entity,
                    catalog_date,
                )
            });

        let title = clip_title(&synthesize_title(
            title_raw.as_deref(),
            &description,
            &procurement_type,
            &entity,
            source,
            &tender_id,
        ));

        let source_url = scalar_string(raw, table.url)
            .filter(|u| u.starts_with("http"))
            .or_else(|| synthesize_url(source, &tender_id));

        let semantic_text = build_semantic_text(
            &title,
            &description,
            &entity,
            &region,
            &procurement_type,
            estimated_amount,
        );

        let completeness = completeness_score(
            title_len >= 10,
            !description.is_empty(),
            entity_present,
            catalog_date.is_some(),
            estimated_amount.is_some(),
        );
        let reliability = self.reliability_score(source, raw);

        let mut metadata = TenderMeta::new(
            extracted_at,
            QualityScores {
                completeness,
                reliability,
            },
        );
        for key in ["search_keyword", "search_date"] {
            if let Some(value) = raw.get(key).and_then(Value::as_str) {
                metadata.search_params.insert(key.to_string(), value.to_string());
            }
        }
        metadata.source_detail = Value::Object(raw.clone());

        let mut tender = Tender {
            tender_id,
            source,
            title,
            description,
            entity,
            region,
            city,
            procurement_type,
            catalog_date,
            opening_date,
            estimated_amount,
            source_url,
            semantic_text,
            embedding: None,
            metadata,
            content_fingerprint: String::new(),
        };
        tender.refresh_fingerprint();

        Some(Normalized {
            tender,
            unparsed_catalog_date,
            unparsed_opening_date,
            unparsed_amount,
        })
    }

    fn reliability_score(&self, source: Source, raw: &RawRecord) -> f64 {
        let mut score = self.reliability.base(source);
        if source == Source::ComprasMx {
            // Rows with many populated cells parse more faithfully.
            let cell_count = raw
                .get("cells")
                .and_then(Value::as_array)
                .map(|c| c.len())
                .unwrap_or(0);
            if cell_count > 8 {
                score += 0.1;
            } else if cell_count < 5 {
                score -= 0.1;
            }
        }
        score.clamp(0.0, 1.0)
    }
}

fn default_entity(source: Source) -> &'static str {
    match source {
        Source::TianguisCdmx => "Ciudad de México",
        Source::LicitaYa => "LicitaYa",
        Source::ComprasMx => "ComprasMX",
    }
}

fn resolve_location(source: Source, raw: &RawRecord, description: &str) -> (String, String) {
    match source {
        Source::TianguisCdmx => {
            let city = scalar_string(raw, &["municipality", "alcaldia"])
                .map(|s| fix_encoding(&s))
                .unwrap_or_default();
            ("Ciudad de México".to_string(), city)
        }
        Source::ComprasMx => {
            let region = state_from_text(description).unwrap_or_else(|| "México".to_string());
            (region, String::new())
        }
        Source::LicitaYa => {
            let region = scalar_string(raw, &["state", "estado", "region"])
                .map(|s| fix_encoding(&s))
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "México".to_string());
            let city = scalar_string(raw, &["city", "ciudad"])
                .map(|s| fix_encoding(&s))
                .unwrap_or_default();
            (region, city)
        }
    }
}

fn state_from_text(text: &str) -> Option<String> {
    let haystack = text.to_lowercase();
    MEXICAN_STATES
        .iter()
        .find(|state| haystack.contains(*state))
        .map(|state| title_case(state))
}

fn title_case(input: &str) -> String {
    input
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) if word != "de" => {
                    first.to_uppercase().collect::<String>() + chars.as_str()
                }
                _ => word.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn synthesize_url(source: Source, tender_id: &str) -> Option<String> {
    match source {
        Source::TianguisCdmx => Some(format!(
            "https://tianguisdigital.cdmx.gob.mx/planeaciones/{tender_id}"
        )),
        Source::ComprasMx => {
            Some("https://comprasmx.buengobierno.gob.mx/sitiopublico/".to_string())
        }
        Source::LicitaYa => Some(format!("https://www.licitaya.com.mx/tender/{tender_id}")),
    }
}

/// Title fallback ladder: source title, first meaningful description
/// sentence, type + entity, then a labeled tender id.
fn synthesize_title(
    title: Option<&str>,
    description: &str,
    procurement_type: &str,
    entity: &str,
    source: Source,
    tender_id: &str,
) -> String {
    if let Some(title) = title {
        if !title.trim().is_empty() {
            return title.trim().to_string();
        }
    }
    if let Some(sentence) = description.split('.').next() {
        let sentence = sentence.trim();
        if sentence.chars().count() > 15 {
            return clip_chars(sentence, 80);
        }
    }
    let has_type = !procurement_type.is_empty() && procurement_type != "Licitación";
    let has_entity = entity != default_entity(source);
    if has_type && has_entity {
        return format!("{procurement_type} - {entity}");
    }
    format!("Licitación {tender_id}")
}

fn clip_title(title: &str) -> String {
    if title.chars().count() <= TITLE_MAX_CHARS {
        title.to_string()
    } else {
        let head: String = title.chars().take(TITLE_MAX_CHARS - 3).collect();
        format!("{}...", head.trim_end())
    }
}

fn clip_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

/// Embedding input text. Fixed section order; when the budget overflows the
/// lowest-priority trailing sections are dropped first.
pub fn build_semantic_text(
    title: &str,
    description: &str,
    entity: &str,
    region: &str,
    procurement_type: &str,
    estimated_amount: Option<f64>,
) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(6);
    if !title.is_empty() {
        parts.push(title.to_string());
    }
    if !description.is_empty() {
        parts.push(description.to_string());
    }
    if !entity.is_empty() {
        parts.push(format!("Entidad: {entity}"));
    }
    if !region.is_empty() {
        parts.push(format!("Estado: {region}"));
    }
    if !procurement_type.is_empty() {
        parts.push(format!("Tipo: {procurement_type}"));
    }
    if let Some(amount) = estimated_amount {
        parts.push(format!("Valor: ${amount:.2}"));
    }

    loop {
        let text = parts.join(" | ");
        if text.chars().count() <= SEMANTIC_TEXT_MAX_CHARS || parts.len() <= 1 {
            return clip_chars(&text, SEMANTIC_TEXT_MAX_CHARS);
        }
        parts.pop();
    }
}

fn completeness_score(
    title: bool,
    description: bool,
    entity: bool,
    catalog_date: bool,
    amount: bool,
) -> f64 {
    let present = [title, description, entity, catalog_date, amount]
        .iter()
        .filter(|p| **p)
        .count();
    present as f64 / 5.0
}

/// First non-empty value among `keys`, stringified. Numbers are accepted so
/// numeric ids survive the JSON round trip.
pub fn scalar_string(raw: &RawRecord, keys: &[&str]) -> Option<String> {
    for key in keys {
        match raw.get(*key) {
            Some(Value::String(s)) if !s.trim().is_empty() => return Some(s.trim().to_string()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

fn take_date(raw: &RawRecord, keys: &[&str]) -> (Option<NaiveDate>, Option<String>) {
    match scalar_string(raw, keys) {
        Some(text) => match parse_date_flexible(&text) {
            Some(date) => (Some(date), None),
            None => (None, Some(text)),
        },
        None => (None, None),
    }
}

fn take_amount(raw: &RawRecord, keys: &[&str]) -> (Option<f64>, Option<String>) {
    for key in keys {
        match raw.get(*key) {
            Some(Value::Number(n)) => return (n.as_f64(), None),
            Some(Value::String(s)) if !s.trim().is_empty() => {
                return match parse_amount(s) {
                    Some(amount) => (Some(amount), None),
                    None => (None, Some(s.trim().to_string())),
                };
            }
            _ => {}
        }
    }
    (None, None)
}

/// Tolerant date parser for the formats the three feeds actually emit:
/// ISO dates and datetimes, `DD/MM/YYYY`, `MM/DD/YYYY`, `DD-MM-YYYY`,
/// `YYYYMMDD`, and Spanish prose like `15 de enero de 2024`.
pub fn parse_date_flexible(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    // ISO datetimes: keep the date component only.
    let head: String = if trimmed.len() > 10 && (trimmed.contains('T') || trimmed.contains(' ')) {
        trimmed.chars().take(10).collect()
    } else {
        trimmed.to_string()
    };

    for format in ["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y", "%d-%m-%Y", "%Y%m%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(&head, format) {
            return Some(date);
        }
    }

    parse_spanish_date(trimmed)
}

fn parse_spanish_date(text: &str) -> Option<NaiveDate> {
    let lowered = text.to_lowercase();
    let month = SPANISH_MONTHS
        .iter()
        .position(|name| lowered.contains(name))
        .map(|idx| idx as u32 + 1)?;

    let numbers: Vec<u32> = digit_groups(&lowered)
        .into_iter()
        .filter_map(|g| g.parse().ok())
        .collect();
    let year = *numbers.iter().find(|n| (1900..2100).contains(*n))?;
    let day = numbers
        .iter()
        .find(|n| (1..=31).contains(*n))
        .copied()
        .unwrap_or(1);
    NaiveDate::from_ymd_opt(year as i32, month, day)
}

pub fn digit_groups(text: &str) -> Vec<String> {
    let mut groups = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if ch.is_ascii_digit() {
            current.push(ch);
        } else if !current.is_empty() {
            groups.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

/// Parses currency text. When both `,` and `.` appear the rightmost
/// separator is taken as the decimal point.
pub fn parse_amount(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let has_comma = cleaned.contains(',');
    let has_dot = cleaned.contains('.');
    let numeric = if has_comma && has_dot {
        if cleaned.rfind(',') > cleaned.rfind('.') {
            cleaned.replace('.', "").replace(',', ".")
        } else {
            cleaned.replace(',', "")
        }
    } else if has_comma {
        // A lone comma followed by exactly two digits is a decimal mark.
        let after = cleaned.rsplit(',').next().unwrap_or("");
        if after.len() == 2 && cleaned.matches(',').count() == 1 {
            cleaned.replace(',', ".")
        } else {
            cleaned.replace(',', "")
        }
    } else {
        cleaned
    };

    numeric.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Repairs double-encoded UTF-8 artifacts and common HTML entities left by
/// upstream feeds.
pub fn fix_encoding(text: &str) -> String {
    const ENTITIES: [(&str, &str); 7] = [
        ("&amp;", "&"),
        ("&lt;", "<"),
        ("&gt;", ">"),
        ("&quot;", "\""),
        ("&#39;", "'"),
        ("&aacute;", "á"),
        ("&nbsp;", " "),
    ];
    const MOJIBAKE: [(&str, &str); 11] = [
        ("Ã¡", "á"),
        ("Ã©", "é"),
        ("Ã­", "í"),
        ("Ã³", "ó"),
        ("Ãº", "ú"),
        ("Ã±", "ñ"),
        ("â€œ", "\""),
        ("â€\u{9d}", "\""),
        ("â€™", "'"),
        ("â€“", "-"),
        ("â€”", "-"),
    ];

    let mut fixed = text.to_string();
    for (from, to) in ENTITIES {
        if fixed.contains(from) {
            fixed = fixed.replace(from, to);
        }
    }
    for (from, to) in MOJIBAKE {
        if fixed.contains(from) {
            fixed = fixed.replace(from, to);
        }
    }
    fixed = fixed.replace('Â', "");
    fixed.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn raw(value: Value) -> RawRecord {
        value.as_object().cloned().unwrap_or_default()
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, 9, 0, 0).unwrap()
    }

    #[test]
    fn cdmx_record_maps_fields_and_synthesizes_url() {
        let record = raw(json!({
            "planning_id": "PL-2024-001",
            "name": "Adquisición de equipo de cómputo",
            "description": "Equipos para oficinas centrales.",
            "entity": "Secretaría de Finanzas",
            "estimated_amount": 1500000.0,
            "planning_date": "2024-03-01",
            "hiring_method_name": "Licitación Pública"
        }));

        let normalized = Normalizer::default()
            .normalize(Source::TianguisCdmx, &record, t0())
            .unwrap();
        let tender = normalized.tender;

        assert_eq!(tender.tender_id, "PL-2024-001");
        assert_eq!(tender.title, "Adquisición de equipo de cómputo");
        assert_eq!(tender.entity, "Secretaría de Finanzas");
        assert_eq!(tender.region, "Ciudad de México");
        assert_eq!(tender.procurement_type, "Licitación Pública");
        assert_eq!(
            tender.catalog_date,
            NaiveDate::from_ymd_opt(2024, 3, 1)
        );
        assert_eq!(tender.estimated_amount, Some(1500000.0));
        assert_eq!(
            tender.source_url.as_deref(),
            Some("https://tianguisdigital.cdmx.gob.mx/planeaciones/PL-2024-001")
        );
        assert_eq!(tender.metadata.quality.completeness, 1.0);
        assert!(!tender.content_fingerprint.is_empty());
    }

    #[test]
    fn unusable_record_is_dropped() {
        let record = raw(json!({ "title": "Obra" }));
        assert!(Normalizer::default()
            .normalize(Source::LicitaYa, &record, t0())
            .is_none());
    }

    #[test]
    fn title_ladder_falls_back_to_description_sentence() {
        let record = raw(json!({
            "id": "LY-9",
            "description": "Mantenimiento preventivo de flota vehicular. Segunda etapa.",
            "entity": "Gobierno de Jalisco"
        }));

        let tender = Normalizer::default()
            .normalize(Source::LicitaYa, &record, t0())
            .unwrap()
            .tender;
        assert_eq!(tender.title, "Mantenimiento preventivo de flota vehicular");
    }

    #[test]
    fn missing_id_is_synthesized_deterministically() {
        let record = raw(json!({
            "title": "Suministro de papelería institucional",
            "entity": "Secretaría de Educación"
        }));

        let normalizer = Normalizer::default();
        let a = normalizer
            .normalize(Source::LicitaYa, &record, t0())
            .unwrap()
            .tender;
        let b = normalizer
            .normalize(Source::LicitaYa, &record, t0())
            .unwrap()
            .tender;
        assert_eq!(a.tender_id, b.tender_id);
        assert!(a.tender_id.starts_with("licita_ya_"));
    }

    #[test]
    fn unparsable_date_and_amount_are_carried_for_recovery() {
        let record = raw(json!({
            "id": "LY-22",
            "title": "Construcción de puente peatonal",
            "entity": "Gobierno de Sonora",
            "date": "apertura el dia 2024/04/15",
            "amount": "por definir"
        }));

        let normalized = Normalizer::default()
            .normalize(Source::LicitaYa, &record, t0())
            .unwrap();
        assert_eq!(normalized.tender.catalog_date, None);
        assert_eq!(
            normalized.unparsed_catalog_date.as_deref(),
            Some("apertura el dia 2024/04/15")
        );
        assert_eq!(normalized.tender.estimated_amount, None);
        assert_eq!(normalized.unparsed_amount.as_deref(), Some("por definir"));
    }

    #[test]
    fn comprasmx_reliability_tracks_cell_count() {
        let sparse = raw(json!({
            "titulo": "Adquisición de mobiliario escolar",
            "entidad": "Secretaría de Educación Pública",
            "cells": ["a", "b", "c"]
        }));
        let rich = raw(json!({
            "titulo": "Adquisición de mobiliario escolar",
            "entidad": "Secretaría de Educación Pública",
            "cells": ["a", "b", "c", "d", "e", "f", "g", "h", "i"]
        }));

        let normalizer = Normalizer::default();
        let sparse_score = normalizer
            .normalize(Source::ComprasMx, &sparse, t0())
            .unwrap()
            .tender
            .metadata
            .quality
            .reliability;
        let rich_score = normalizer
            .normalize(Source::ComprasMx, &rich, t0())
            .unwrap()
            .tender
            .metadata
            .quality
            .reliability;
        assert!((sparse_score - 0.7).abs() < 1e-9);
        assert!((rich_score - 0.9).abs() < 1e-9);
    }

    #[test]
    fn comprasmx_region_comes_from_description_text() {
        let record = raw(json!({
            "titulo": "Servicio de limpieza integral",
            "entidad": "Instituto de Salud",
            "descripcion": "Servicio de limpieza en hospitales de Nuevo León"
        }));

        let tender = Normalizer::default()
            .normalize(Source::ComprasMx, &record, t0())
            .unwrap()
            .tender;
        assert_eq!(tender.region, "Nuevo León");
    }

    #[test]
    fn date_parser_accepts_feed_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 4, 15).unwrap();
        for text in [
            "2024-04-15",
            "15/04/2024",
            "15-04-2024",
            "20240415",
            "2024-04-15T08:30:00Z",
            "15 de abril de 2024",
        ] {
            assert_eq!(parse_date_flexible(text), Some(expected), "{text}");
        }
        // Month-and-year prose defaults the day to the first.
        assert_eq!(
            parse_date_flexible("abril de 2024"),
            NaiveDate::from_ymd_opt(2024, 4, 1)
        );
        assert_eq!(parse_date_flexible("pendiente"), None);
    }

    #[test]
    fn amount_parser_disambiguates_separators() {
        assert_eq!(parse_amount("$1,234.56"), Some(1234.56));
        assert_eq!(parse_amount("1.234,56 MXN"), Some(1234.56));
        assert_eq!(parse_amount("$2,500"), Some(2500.0));
        assert_eq!(parse_amount("150,75"), Some(150.75));
        assert_eq!(parse_amount("sin monto"), None);
    }

    #[test]
    fn encoding_repair_fixes_mojibake_and_entities() {
        assert_eq!(
            fix_encoding("AdquisiciÃ³n de tecnologÃ­a &amp; servicios"),
            "Adquisición de tecnología & servicios"
        );
        assert_eq!(fix_encoding("  ComisiÃ³n Â federal "), "Comisión  federal");
    }

    #[test]
    fn long_titles_are_clipped_with_ellipsis() {
        let long = "a".repeat(200);
        let record = raw(json!({
            "id": "LY-1",
            "title": long,
            "entity": "Gobierno de Puebla"
        }));

        let tender = Normalizer::default()
            .normalize(Source::LicitaYa, &record, t0())
            .unwrap()
            .tender;
        assert_eq!(tender.title.chars().count(), 150);
        assert!(tender.title.ends_with("..."));
    }

    #[test]
    fn semantic_text_joins_labeled_sections_in_order() {
        let text = build_semantic_text(
            "Título",
            "Descripción",
            "Entidad X",
            "Jalisco",
            "Licitación Pública",
            Some(1000.0),
        );
        assert_eq!(
            text,
            "Título | Descripción | Entidad: Entidad X | Estado: Jalisco | Tipo: Licitación Pública | Valor: $1000.00"
        );
    }

    #[test]
    fn semantic_text_drops_trailing_sections_when_over_budget() {
        let huge = "d".repeat(SEMANTIC_TEXT_MAX_CHARS - 20);
        let text = build_semantic_text("Título", &huge, "Entidad X", "Jalisco", "Obra", None);
        assert!(text.chars().count() <= SEMANTIC_TEXT_MAX_CHARS);
        assert!(text.starts_with("Título | "));
        assert!(!text.contains("Tipo:"));
    }
}
