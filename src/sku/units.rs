// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Unit-of-measure normalization.
//!
//! Maps spelling variants (Latin and Cyrillic, singular/plural, with and
//! without trailing dots) onto one canonical code so that `"kg"`,
//! `"кг."` and `"килограмм"` compare equal.

/// canonical code → accepted spellings (already lowercased)
static UNIT_SYNONYMS: &[(&str, &[&str])] = &[
    (
        "kg",
        &[
            "kg", "kgs", "kilo", "kilogram", "kilograms", "кг", "килограмм", "килограмма",
            "килограммов",
        ],
    ),
    ("g", &["g", "gr", "gram", "grams", "г", "гр", "грамм", "грамма", "граммов"]),
    ("t", &["t", "ton", "tons", "tonne", "tonnes", "т", "тн", "тонна", "тонны", "тонн"]),
    ("l", &["l", "liter", "litre", "liters", "litres", "л", "литр", "литра", "литров"]),
    ("ml", &["ml", "milliliter", "millilitre", "milliliters", "мл", "миллилитр", "миллилитров"]),
    (
        "m3",
        &[
            "m3", "m³", "cbm", "cubic meter", "cubic metre", "м3", "м³", "куб", "куб.м", "кубометр",
            "кубометров",
        ],
    ),
    (
        "m2",
        &[
            "m2", "m²", "sqm", "sq m", "square meter", "square metre", "м2", "м²", "кв.м",
            "квадратный метр",
        ],
    ),
    (
        "m",
        &[
            "m", "meter", "metre", "meters", "metres", "lm", "м", "метр", "метра", "метров",
            "пог.м", "п.м",
        ],
    ),
    ("mm", &["mm", "millimeter", "millimetre", "мм", "миллиметр"]),
    ("cm", &["cm", "centimeter", "centimetre", "см", "сантиметр"]),
    (
        "pcs",
        &[
            "pcs", "pc", "piece", "pieces", "ea", "each", "unit", "units", "шт", "штука", "штуки",
            "штук",
        ],
    ),
    ("pack", &["pack", "pk", "package", "упак", "упаковка", "пачка"]),
    ("bag", &["bag", "bags", "sack", "мешок", "меш"]),
    ("roll", &["roll", "rolls", "рул", "рулон"]),
];

fn lookup(candidate: &str) -> Option<&'static str> {
    UNIT_SYNONYMS
        .iter()
        .find(|(_, spellings)| spellings.iter().any(|s| *s == candidate))
        .map(|(canonical, _)| *canonical)
}

/// Canonical unit code, or the cleaned input when the unit is unknown.
#[must_use]
pub fn normalize_unit(unit: &str) -> String {
    let cleaned = unit
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    let cleaned = cleaned.trim_end_matches('.').to_string();

    if let Some(canonical) = lookup(&cleaned) {
        return canonical.to_string();
    }
    // "кв. м" → "кв.м"
    let compact: String = cleaned.chars().filter(|c| !c.is_whitespace()).collect();
    lookup(&compact).map_or(cleaned, str::to_string)
}

/// Both units normalize to the same code.
#[must_use]
pub fn units_match(a: &str, b: &str) -> bool {
    let (a, b) = (normalize_unit(a), normalize_unit(b));
    !a.is_empty() && a == b
}
