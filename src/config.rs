//! Run configuration threaded through the analysis components.

use crate::derived::{BOOL_GRAPHIC_PROPERTIES, SUM_GRAPHIC_PROPERTIES};

/// Flags that several components consult. Built once from the CLI and
/// passed explicitly rather than read from ambient state.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnalyzeConfig {
    pub verbose: bool,
    /// Restrict to the requested fields when loading previously exported
    /// csv files too, not just when parsing logs.
    pub filter_csv: bool,
}

/// The standard field set collected for every analysis run: frame timing,
/// session identity, avatar cost, texture stats, and every derived
/// attachment aggregate.
pub fn default_fields() -> Vec<String> {
    let mut fields: Vec<String> = [
        "Timers.Frame.Time",
        "Session.UniqueHostID",
        "Session.UniqueSessionUUID",
        "Summary.Timestamp",
        "Avatars.Self.ARCCalculated",
        "Avatars.Self.OutfitName",
        "Avatars.Self.AttachmentSurfaceArea",
        "Avatars.Self.AttachmentTextures.material_texture_count",
        "Avatars.Self.AttachmentTextures.material_texture_missing",
        "Avatars.Self.AttachmentTextures.material_texture_mpixels",
        "Avatars.Self.AttachmentTextures.texture_count",
        "Avatars.Self.AttachmentTextures.texture_missing",
        "Avatars.Self.AttachmentTextures.texture_mpixels",
        "Derived.Avatar.Attachments.Count",
        "Derived.Avatar.Attachments.MeshCount",
        "Derived.Avatar.Attachments.triangles_high",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    fields.extend(
        BOOL_GRAPHIC_PROPERTIES
            .iter()
            .map(|key| format!("Derived.Avatar.Attachments.{key}")),
    );
    fields.extend(
        SUM_GRAPHIC_PROPERTIES
            .iter()
            .map(|key| format!("Derived.Avatar.Attachments.{key}")),
    );
    fields
}
