//! Variation taxonomy and variant combinator.
//!
//! A product's sellable variants are the cartesian product of the option
//! choices made along each variation axis (Size, Color, ...). Expansion is a
//! pure in-memory computation: the same selection always produces the same
//! SKU and name sequence.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::value_objects::Money;

/// Fallback SKU prefix for products saved without one.
const DEFAULT_SKU_PREFIX: &str = "PRD";

/// An axis of variation, e.g. Size or Color.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VariationType {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub sort_order: i32,
    pub is_active: bool,
}

impl VariationType {
    /// URL-safe slug derived from a display name ("Shoe Size" -> "shoe-size").
    pub fn slugify(name: &str) -> String {
        name.trim()
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("-")
    }
}

/// One choice on a variation axis. `code` is the short token used verbatim
/// when assembling SKUs; `value` carries extra display data such as a hex
/// color.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VariationOption {
    pub id: Uuid,
    pub type_id: Uuid,
    pub name: String,
    pub code: String,
    pub value: Option<String>,
    pub sort_order: i32,
    pub is_active: bool,
}

#[derive(Debug, Clone, Error)]
pub enum SelectionError {
    #[error("option '{option}' does not belong to axis '{axis}'")]
    OptionTypeMismatch { option: String, axis: String },
    #[error("option code '{0}' exceeds 10 characters")]
    CodeTooLong(String),
}

/// One axis of a selection: a variation type together with the chosen
/// options, in the order the operator picked them.
#[derive(Clone, Debug)]
pub struct Axis {
    variation_type: VariationType,
    options: Vec<VariationOption>,
}

impl Axis {
    /// Builds an axis, rejecting options that belong to another type and
    /// collapsing duplicate option ids to their first occurrence.
    pub fn new(
        variation_type: VariationType,
        options: Vec<VariationOption>,
    ) -> Result<Self, SelectionError> {
        let mut seen = Vec::new();
        let mut kept = Vec::new();
        for option in options {
            if option.type_id != variation_type.id {
                return Err(SelectionError::OptionTypeMismatch {
                    option: option.name,
                    axis: variation_type.name,
                });
            }
            if option.code.len() > 10 {
                return Err(SelectionError::CodeTooLong(option.code));
            }
            if seen.contains(&option.id) {
                continue;
            }
            seen.push(option.id);
            kept.push(option);
        }
        Ok(Self { variation_type, options: kept })
    }

    pub fn variation_type(&self) -> &VariationType {
        &self.variation_type
    }

    pub fn options(&self) -> &[VariationOption] {
        &self.options
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }
}

/// The operator's option choices across all axes.
#[derive(Clone, Debug, Default)]
pub struct Selection {
    axes: Vec<Axis>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, axis: Axis) {
        self.axes.push(axis);
    }

    pub fn with_axis(mut self, axis: Axis) -> Self {
        self.push(axis);
        self
    }

    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    /// Axes that contribute to expansion: non-empty ones, ordered by the
    /// type's configured sort order. The sort is stable, so axes sharing a
    /// sort order keep the order they were supplied in.
    fn effective_axes(&self) -> Vec<&Axis> {
        let mut axes: Vec<&Axis> = self.axes.iter().filter(|a| !a.is_empty()).collect();
        axes.sort_by_key(|a| a.variation_type.sort_order);
        axes
    }
}

/// A candidate variant produced by expansion. Price defaults to the base
/// price and stock to zero; the operator edits both before saving.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VariantDraft {
    pub option_ids: Vec<Uuid>,
    pub sku: String,
    pub name: String,
    pub price: Money,
    pub stock: u32,
}

/// Expands a selection into the full cross-product of variant drafts.
///
/// Returns an empty list when no axis contributes options, in which case the
/// caller treats the product as a simple, non-variant product. Colliding SKUs
/// (duplicate codes across axes) are emitted as-is; uniqueness is enforced at
/// persistence time, never by silent renaming here.
pub fn expand(selection: &Selection, prefix: &str, base_price: &Money) -> Vec<VariantDraft> {
    let axes = selection.effective_axes();
    if axes.is_empty() {
        return Vec::new();
    }

    let prefix = if prefix.trim().is_empty() {
        DEFAULT_SKU_PREFIX
    } else {
        prefix.trim()
    };

    // Iterative cartesian fold: each pass extends every partial combination
    // with every option of the next axis.
    let mut combos: Vec<Vec<&VariationOption>> = vec![Vec::new()];
    for axis in &axes {
        let mut next = Vec::with_capacity(combos.len() * axis.options.len());
        for combo in &combos {
            for option in &axis.options {
                let mut extended = combo.clone();
                extended.push(option);
                next.push(extended);
            }
        }
        combos = next;
    }

    combos
        .into_iter()
        .map(|combo| {
            let codes: Vec<&str> = combo.iter().map(|o| o.code.as_str()).collect();
            let names: Vec<&str> = combo.iter().map(|o| o.name.as_str()).collect();
            VariantDraft {
                option_ids: combo.iter().map(|o| o.id).collect(),
                sku: format!("{}-{}", prefix, codes.join("-")),
                name: names.join(" / "),
                price: base_price.clone(),
                stock: 0,
            }
        })
        .collect()
}

/// Draft list under operator editing, between expansion and save.
///
/// Edits live only until the next expansion; regenerating from a changed
/// selection recomputes everything from scratch and defaults.
#[derive(Clone, Debug, Default)]
pub struct VariantDrafts(Vec<VariantDraft>);

impl VariantDrafts {
    pub fn new(drafts: Vec<VariantDraft>) -> Self {
        Self(drafts)
    }

    pub fn as_slice(&self) -> &[VariantDraft] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<VariantDraft> {
        self.0
    }

    pub fn set_price(&mut self, index: usize, price: Money) {
        if let Some(draft) = self.0.get_mut(index) {
            draft.price = price;
        }
    }

    pub fn set_stock(&mut self, index: usize, stock: u32) {
        if let Some(draft) = self.0.get_mut(index) {
            draft.stock = stock;
        }
    }

    pub fn set_all_prices(&mut self, price: &Money) {
        for draft in &mut self.0 {
            draft.price = price.clone();
        }
    }

    pub fn set_all_stock(&mut self, stock: u32) {
        for draft in &mut self.0 {
            draft.stock = stock;
        }
    }

    pub fn remove(&mut self, index: usize) {
        if index < self.0.len() {
            self.0.remove(index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::BTreeSet;

    fn axis_type(name: &str, sort_order: i32) -> VariationType {
        VariationType {
            id: Uuid::new_v4(),
            name: name.to_string(),
            slug: VariationType::slugify(name),
            sort_order,
            is_active: true,
        }
    }

    fn option(type_id: Uuid, name: &str, code: &str, sort_order: i32) -> VariationOption {
        VariationOption {
            id: Uuid::new_v4(),
            type_id,
            name: name.to_string(),
            code: code.to_string(),
            value: None,
            sort_order,
            is_active: true,
        }
    }

    fn size_color_selection() -> Selection {
        let size = axis_type("Size", 1);
        let color = axis_type("Color", 2);
        let sizes = vec![
            option(size.id, "Small", "S", 1),
            option(size.id, "Medium", "M", 2),
            option(size.id, "Large", "L", 3),
        ];
        let colors = vec![
            option(color.id, "Red", "RD", 1),
            option(color.id, "Blue", "BL", 2),
        ];
        Selection::new()
            .with_axis(Axis::new(size, sizes).unwrap())
            .with_axis(Axis::new(color, colors).unwrap())
    }

    #[test]
    fn test_cardinality_is_product_of_axis_lengths() {
        let drafts = expand(&size_color_selection(), "TEE", &Money::ngn(dec!(1000)));
        assert_eq!(drafts.len(), 6);

        let id_sets: BTreeSet<BTreeSet<Uuid>> = drafts
            .iter()
            .map(|d| d.option_ids.iter().copied().collect())
            .collect();
        assert_eq!(id_sets.len(), 6, "no two drafts share an option-id set");
    }

    #[test]
    fn test_sku_and_name_derivation() {
        let drafts = expand(&size_color_selection(), "TEE", &Money::ngn(dec!(1000)));
        assert_eq!(drafts[0].sku, "TEE-S-RD");
        assert_eq!(drafts[0].name, "Small / Red");
        assert_eq!(drafts[5].sku, "TEE-L-BL");
        assert_eq!(drafts[5].name, "Large / Blue");
        assert!(drafts.iter().all(|d| d.price == Money::ngn(dec!(1000))));
        assert!(drafts.iter().all(|d| d.stock == 0));
    }

    #[test]
    fn test_expansion_is_deterministic() {
        let selection = size_color_selection();
        let a = expand(&selection, "TEE", &Money::ngn(dec!(1000)));
        let b = expand(&selection, "TEE", &Money::ngn(dec!(1000)));
        let skus_a: Vec<_> = a.iter().map(|d| d.sku.as_str()).collect();
        let skus_b: Vec<_> = b.iter().map(|d| d.sku.as_str()).collect();
        assert_eq!(skus_a, skus_b);
        let names_a: Vec<_> = a.iter().map(|d| d.name.as_str()).collect();
        let names_b: Vec<_> = b.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names_a, names_b);
    }

    #[test]
    fn test_axes_ordered_by_sort_order_not_insertion() {
        let size = axis_type("Size", 2);
        let color = axis_type("Color", 1);
        let selection = Selection::new()
            .with_axis(Axis::new(size.clone(), vec![option(size.id, "Small", "S", 1)]).unwrap())
            .with_axis(Axis::new(color.clone(), vec![option(color.id, "Red", "RD", 1)]).unwrap());
        let drafts = expand(&selection, "TEE", &Money::ngn(dec!(500)));
        // Color sorts ahead of Size, so its token leads.
        assert_eq!(drafts[0].sku, "TEE-RD-S");
        assert_eq!(drafts[0].name, "Red / Small");
    }

    #[test]
    fn test_empty_axes_are_ignored() {
        let size = axis_type("Size", 1);
        let color = axis_type("Color", 2);
        let selection = Selection::new()
            .with_axis(Axis::new(size.clone(), vec![option(size.id, "Small", "S", 1)]).unwrap())
            .with_axis(Axis::new(color, vec![]).unwrap());
        let drafts = expand(&selection, "TEE", &Money::ngn(dec!(500)));
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].sku, "TEE-S");
    }

    #[test]
    fn test_all_axes_empty_yields_simple_product() {
        let size = axis_type("Size", 1);
        let selection = Selection::new().with_axis(Axis::new(size, vec![]).unwrap());
        assert!(expand(&selection, "TEE", &Money::ngn(dec!(500))).is_empty());
        assert!(expand(&Selection::new(), "TEE", &Money::ngn(dec!(500))).is_empty());
    }

    #[test]
    fn test_blank_prefix_falls_back() {
        let size = axis_type("Size", 1);
        let selection =
            Selection::new().with_axis(Axis::new(size.clone(), vec![option(size.id, "Small", "S", 1)]).unwrap());
        let drafts = expand(&selection, "  ", &Money::ngn(dec!(500)));
        assert_eq!(drafts[0].sku, "PRD-S");
    }

    #[test]
    fn test_duplicate_codes_are_not_deduplicated() {
        let size = axis_type("Size", 1);
        let finish = axis_type("Finish", 2);
        let selection = Selection::new()
            .with_axis(Axis::new(size.clone(), vec![option(size.id, "Medium", "M", 1)]).unwrap())
            .with_axis(
                Axis::new(
                    finish.clone(),
                    vec![
                        option(finish.id, "Matte", "M", 1),
                        option(finish.id, "Matte Black", "M", 2),
                    ],
                )
                .unwrap(),
            );
        let drafts = expand(&selection, "CUP", &Money::ngn(dec!(500)));
        assert_eq!(drafts.len(), 2);
        // Both combinations carry the same SKU; the collision is surfaced at
        // persistence time, not resolved here.
        assert_eq!(drafts[0].sku, "CUP-M-M");
        assert_eq!(drafts[1].sku, "CUP-M-M");
        assert_ne!(drafts[0].option_ids, drafts[1].option_ids);
    }

    #[test]
    fn test_duplicate_option_ids_collapse() {
        let size = axis_type("Size", 1);
        let small = option(size.id, "Small", "S", 1);
        let axis = Axis::new(size, vec![small.clone(), small]).unwrap();
        assert_eq!(axis.options().len(), 1);
    }

    #[test]
    fn test_option_from_wrong_type_is_rejected() {
        let size = axis_type("Size", 1);
        let color = axis_type("Color", 2);
        let err = Axis::new(size, vec![option(color.id, "Red", "RD", 1)]);
        assert!(matches!(err, Err(SelectionError::OptionTypeMismatch { .. })));
    }

    #[test]
    fn test_wide_selection_expands_fully() {
        // Three axes of ten options: 1000 combinations.
        let mut selection = Selection::new();
        for (i, name) in ["Size", "Color", "Material"].into_iter().enumerate() {
            let t = axis_type(name, i as i32);
            let options = (0..10)
                .map(|n| option(t.id, &format!("{name} {n}"), &format!("{}{}", &name[..1], n), n))
                .collect();
            selection.push(Axis::new(t, options).unwrap());
        }
        let drafts = expand(&selection, "BAG", &Money::ngn(dec!(250)));
        assert_eq!(drafts.len(), 1000);
    }

    #[test]
    fn test_draft_bulk_edits() {
        let mut drafts = VariantDrafts::new(expand(
            &size_color_selection(),
            "TEE",
            &Money::ngn(dec!(1000)),
        ));
        drafts.set_all_prices(&Money::ngn(dec!(1200)));
        drafts.set_all_stock(4);
        drafts.set_price(0, Money::ngn(dec!(1500)));
        drafts.set_stock(1, 9);
        drafts.remove(5);

        let slice = drafts.as_slice();
        assert_eq!(slice.len(), 5);
        assert_eq!(slice[0].price, Money::ngn(dec!(1500)));
        assert_eq!(slice[1].stock, 9);
        assert_eq!(slice[2].price, Money::ngn(dec!(1200)));
        assert_eq!(slice[2].stock, 4);
    }

    #[test]
    fn test_slugify() {
        assert_eq!(VariationType::slugify("Shoe Size"), "shoe-size");
        assert_eq!(VariationType::slugify("  Color "), "color");
    }
}
