//! Table formatting utilities for structured output.

use comfy_table::{
    Attribute, Cell, CellAlignment, Color, Table,
    modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL,
};

use crate::collection::SearchHit;
use crate::retrieve::RetrieverStats;

/// Characters of document text shown per hit.
const HIT_PREVIEW_CHARS: usize = 120;

/// Create a table of collection sizes for one tenant.
pub fn create_stats_table(stats: &RetrieverStats) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.apply_modifier(UTF8_ROUND_CORNERS);

    table.set_header(vec![
        Cell::new("Knowledge base").add_attribute(Attribute::Bold),
        Cell::new("Collection").add_attribute(Attribute::Bold),
        Cell::new("Documents").add_attribute(Attribute::Bold),
    ]);

    for collection in &stats.collections {
        table.add_row(vec![
            Cell::new(collection.knowledge_base.label()),
            Cell::new(&collection.collection),
            Cell::new(collection.count).set_alignment(CellAlignment::Right),
        ]);
    }

    table.add_row(vec![
        Cell::new("TOTAL").add_attribute(Attribute::Bold),
        Cell::new(format!("{} ({}d)", stats.embedding_model, stats.dimension)),
        Cell::new(stats.total())
            .add_attribute(Attribute::Bold)
            .set_alignment(CellAlignment::Right),
    ]);

    table.to_string()
}

/// Create a table of search hits, closest first.
pub fn create_hits_table(hits: &[SearchHit]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.apply_modifier(UTF8_ROUND_CORNERS);

    table.set_header(vec![
        Cell::new("#").add_attribute(Attribute::Bold),
        Cell::new("Distance").add_attribute(Attribute::Bold),
        Cell::new("Title").add_attribute(Attribute::Bold),
        Cell::new("Text").add_attribute(Attribute::Bold),
    ]);

    for (rank, hit) in hits.iter().enumerate() {
        let distance = hit.distance.get();
        // Rough bands for unit-length embeddings
        let color = if distance < 0.5 {
            Color::Green
        } else if distance < 1.0 {
            Color::Yellow
        } else {
            Color::Red
        };
        let title = hit
            .metadata
            .get("title")
            .or_else(|| hit.metadata.get("filename"))
            .map(ToString::to_string)
            .unwrap_or_default();

        table.add_row(vec![
            Cell::new(rank + 1),
            Cell::new(format!("{distance:.3}")).fg(color),
            Cell::new(title),
            Cell::new(preview(&hit.document)),
        ]);
    }

    table.to_string()
}

fn preview(text: &str) -> String {
    let flattened = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flattened.chars().count() <= HIT_PREVIEW_CHARS {
        return flattened;
    }
    let mut cut: String = flattened.chars().take(HIT_PREVIEW_CHARS).collect();
    cut.push('…');
    cut
}
