use crate::models::{CategoryOverride, NormalizedTransaction, Transaction};

/// Anything whose category a user override can replace.
pub trait Categorizable {
    fn description(&self) -> &str;
    fn raw_description(&self) -> &str;
    fn set_category(&mut self, category: String, subcategory: Option<String>);
}

impl Categorizable for NormalizedTransaction {
    fn description(&self) -> &str {
        &self.description
    }

    fn raw_description(&self) -> &str {
        &self.raw_description
    }

    fn set_category(&mut self, category: String, subcategory: Option<String>) {
        self.category = category;
        self.subcategory = subcategory;
    }
}

impl Categorizable for Transaction {
    fn description(&self) -> &str {
        &self.description
    }

    fn raw_description(&self) -> &str {
        &self.raw_description
    }

    fn set_category(&mut self, category: String, subcategory: Option<String>) {
        self.category = category;
        self.subcategory = subcategory;
    }
}

/// First rule, in user order, matching either the cleaned or the raw
/// description.
pub fn find_override<'a, T: Categorizable>(
    rules: &'a [CategoryOverride],
    item: &T,
) -> Option<&'a CategoryOverride> {
    rules.iter().find(|rule| {
        rule.matcher.is_match(item.description()) || rule.matcher.is_match(item.raw_description())
    })
}

/// Apply the first matching override to each item. Returns how many changed.
pub fn apply_overrides<T: Categorizable>(rules: &[CategoryOverride], items: &mut [T]) -> usize {
    if rules.is_empty() {
        return 0;
    }
    let mut applied = 0;
    for item in items.iter_mut() {
        if let Some(rule) = find_override(rules, item) {
            item.set_category(rule.category.clone(), rule.subcategory.clone());
            applied += 1;
        }
    }
    applied
}
