//! Srcset matrix expansion.

use crate::types::{VariantDefinition, VariantFormat};

/// Expand widths × formats into variant definitions.
///
/// Widths are the outer loop and formats the inner one, so for widths
/// `[100, 200]` and formats `[jpeg, webp]` the order is
/// `100/jpeg, 100/webp, 200/jpeg, 200/webp`. Variants are submitted and
/// reported in this order.
pub fn build_matrix(widths: &[u32], formats: &[VariantFormat]) -> Vec<VariantDefinition> {
    widths
        .iter()
        .flat_map(|&width| {
            formats
                .iter()
                .map(move |&format| VariantDefinition { format, width })
        })
        .collect()
}
