//! Greedy folder → product assignment.
//!
//! Each product (in catalog order) takes the best-scoring unclaimed folder at or
//! above [`ACCEPT_THRESHOLD`]. A claimed folder is out of the running for every
//! later product of the same pass, so the outcome depends on product order.

use std::collections::HashSet;

use indexmap::IndexMap;
use tracing::debug;

use crate::config::CategoryKeyword;
use crate::images::tree::ProductFolder;
use crate::normalization::product_name::{collapse_separators, loose_key, path_words, ProductKey};

pub const EXACT_MATCH_SCORE: u32 = 100;
pub const CATEGORY_SCORE: u32 = 25;
pub const WORD_SCORE: u32 = 15;
pub const ACCEPT_THRESHOLD: u32 = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogProduct {
    pub id: String,
    pub name: String,
}

impl CatalogProduct {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub product_id: String,
    pub product_name: String,
    pub folder_key: String,
    pub score: u32,
    pub images: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MatchOutcome {
    pub assignments: Vec<Assignment>,
    /// Products with no folder reaching the threshold; left untouched.
    pub unmatched: Vec<CatalogProduct>,
}

pub struct FolderMatcher {
    keywords: Vec<CategoryKeyword>,
}

impl FolderMatcher {
    pub fn new(keywords: &[CategoryKeyword]) -> Self {
        Self {
            keywords: keywords.to_vec(),
        }
    }

    /// Score one (product, folder) pair. Never fails.
    pub fn score(&self, product: &ProductKey, folder: &ProductFolder) -> u32 {
        let folder_name = collapse_separators(&folder.folder_name());
        let category = folder.category();

        let mut score = 0;
        if folder_name.trim() == product.normalized() {
            score += EXACT_MATCH_SCORE;
        }

        let category_hit = !category.is_empty()
            && self
                .keywords
                .iter()
                .any(|k| k.category == category && product.mentions(&k.keyword));
        if category_hit {
            score += CATEGORY_SCORE;
        }

        let folder_words = path_words(&folder.key());
        let shared = product
            .words()
            .iter()
            .filter(|w| folder_words.contains(*w))
            .count() as u32;
        score + shared * WORD_SCORE
    }

    /// Assign folders to `products` in the given order.
    pub fn assign(
        &self,
        products: &[CatalogProduct],
        folders: &IndexMap<String, ProductFolder>,
        path_prefix: &str,
    ) -> MatchOutcome {
        let mut claimed: HashSet<&str> = HashSet::new();
        let mut outcome = MatchOutcome::default();

        for product in products {
            let key = ProductKey::new(&product.name);
            let mut best: Option<(&str, &ProductFolder, u32)> = None;

            for (folder_key, folder) in folders {
                if claimed.contains(folder_key.as_str()) {
                    continue;
                }
                let score = self.score(&key, folder);
                let running = best.map(|(_, _, s)| s).unwrap_or(0);
                if score > running && score >= ACCEPT_THRESHOLD {
                    best = Some((folder_key.as_str(), folder, score));
                }
            }

            match best {
                Some((folder_key, folder, score)) => {
                    claimed.insert(folder_key);
                    debug!(target = "matching", product = %product.name, folder = %folder_key, score, "assigned");
                    outcome.assignments.push(Assignment {
                        product_id: product.id.clone(),
                        product_name: product.name.clone(),
                        folder_key: folder_key.to_string(),
                        score,
                        images: folder.image_urls(path_prefix),
                    });
                }
                None => {
                    debug!(target = "matching", product = %product.name, "no folder above threshold");
                    outcome.unmatched.push(product.clone());
                }
            }
        }
        outcome
    }
}

/// Products whose loosely normalized name equals no folder's last segment.
/// Diagnostic only: the matcher itself does not require exact names.
pub fn exact_name_misses<'a>(
    products: &'a [CatalogProduct],
    folders: &IndexMap<String, ProductFolder>,
) -> Vec<&'a CatalogProduct> {
    let names: HashSet<String> = folders.values().map(|f| loose_key(&f.folder_name())).collect();
    products
        .iter()
        .filter(|p| !names.contains(&loose_key(&p.name)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CatalogRules;

    const PREFIX: &str = "/storage/uploads/products";

    fn folders(paths: &[(&str, &[&str])]) -> IndexMap<String, ProductFolder> {
        paths
            .iter()
            .map(|(path, images)| {
                let folder = ProductFolder {
                    relative_path: path.to_string(),
                    images: images.iter().map(|s| s.to_string()).collect(),
                };
                (folder.key(), folder)
            })
            .collect()
    }

    fn matcher() -> FolderMatcher {
        FolderMatcher::new(&CatalogRules::default().category_keywords)
    }

    #[test]
    fn boxer_scenario_matches_with_category_and_words() {
        let tree = folders(&[("boys/Cantex Junior Boxer", &["a.jpg", "b.png"])]);
        let products = vec![CatalogProduct::new("1", "Boys Cantex Junior Boxer")];

        let outcome = matcher().assign(&products, &tree, PREFIX);
        assert!(outcome.unmatched.is_empty());
        let a = &outcome.assignments[0];
        // category bonus plus boys, cantex, junior, boxer
        assert_eq!(a.score, 25 + 4 * 15);
        assert_eq!(
            a.images,
            vec![
                "/storage/uploads/products/boys/cantex junior boxer/a.jpg",
                "/storage/uploads/products/boys/cantex junior boxer/b.png",
            ]
        );
    }

    #[test]
    fn exact_name_wins_over_word_overlap() {
        let tree = folders(&[
            ("mens/classic-extra", &["1.jpg"]),
            ("mens/mens classic", &["2.jpg"]),
        ]);
        let products = vec![CatalogProduct::new("7", "Mens Classic")];
        let outcome = matcher().assign(&products, &tree, PREFIX);
        assert_eq!(outcome.assignments[0].folder_key, "mens/mens classic");
        assert!(outcome.assignments[0].score >= EXACT_MATCH_SCORE);
    }

    #[test]
    fn category_folder_beats_partial_overlap() {
        let tree = folders(&[
            ("mens/classic-extra", &["1.jpg"]),
            ("mens/classic", &["2.jpg"]),
        ]);
        let products = vec![CatalogProduct::new("7", "Mens Classic")];
        let outcome = matcher().assign(&products, &tree, PREFIX);
        assert_eq!(outcome.assignments[0].folder_key, "mens/classic");
    }

    #[test]
    fn scores_below_threshold_are_never_assigned() {
        // one shared word, no category: 15 < 20
        let tree = folders(&[("misc/cotton socks", &["1.jpg"])]);
        let products = vec![CatalogProduct::new("1", "Cotton Shirt")];
        let m = matcher();
        assert_eq!(
            m.score(&ProductKey::new("Cotton Shirt"), &tree["misc/cotton socks"]),
            15
        );
        let outcome = m.assign(&products, &tree, PREFIX);
        assert!(outcome.assignments.is_empty());
        assert_eq!(outcome.unmatched, products);
    }

    #[test]
    fn category_bonus_is_counted_once() {
        let tree = folders(&[("mens/underwear", &["1.jpg"])]);
        let key = ProductKey::new("Cantex Mens Briefs");
        // "mens" and "cantex mens" both point at mens; bonus + shared "mens"
        assert_eq!(matcher().score(&key, &tree["mens/underwear"]), 25 + 15);
    }

    #[test]
    fn single_segment_folder_gets_no_category_bonus() {
        let tree = folders(&[("boys", &["1.jpg"])]);
        let key = ProductKey::new("Boys");
        // exact name only; word "boys" is 4 chars and also shared
        assert_eq!(matcher().score(&key, &tree["boys"]), 100 + 15);
    }

    #[test]
    fn no_folder_is_claimed_twice() {
        let tree = folders(&[
            ("girls/vest", &["1.jpg"]),
            ("women/vest", &["2.jpg"]),
        ]);
        let products = vec![
            CatalogProduct::new("1", "Girls Vest"),
            CatalogProduct::new("2", "Girls Vest Cotton"),
            CatalogProduct::new("3", "Women Vest"),
            CatalogProduct::new("4", "Women Vest Lace"),
        ];
        let outcome = matcher().assign(&products, &tree, PREFIX);

        let mut seen = HashSet::new();
        for a in &outcome.assignments {
            assert!(seen.insert(a.folder_key.clone()), "{} claimed twice", a.folder_key);
        }
        assert_eq!(outcome.assignments.len(), 2);
        assert_eq!(outcome.unmatched.len(), 2);
    }

    #[test]
    fn earlier_products_win_contested_folders() {
        let tree = folders(&[("boys/vest", &["1.jpg"])]);
        let a = CatalogProduct::new("a", "Boys Vest White");
        let b = CatalogProduct::new("b", "Boys Vest");

        let first = matcher().assign(&[a.clone(), b.clone()], &tree, PREFIX);
        assert_eq!(first.assignments[0].product_id, "a");
        let second = matcher().assign(&[b, a], &tree, PREFIX);
        assert_eq!(second.assignments[0].product_id, "b");
    }

    #[test]
    fn injected_keywords_replace_defaults() {
        let tree = folders(&[("kids/sleepwear", &["1.jpg"])]);
        let key = ProductKey::new("Junior Pajama");
        let custom = FolderMatcher::new(&[CategoryKeyword::new("Junior", "Kids")]);
        assert_eq!(custom.score(&key, &tree["kids/sleepwear"]), 25);
        assert_eq!(matcher().score(&key, &tree["kids/sleepwear"]), 0);
    }

    #[test]
    fn exact_name_misses_uses_loose_names() {
        let tree = folders(&[("boys/junior-brief", &["1.jpg"])]);
        let products = vec![
            CatalogProduct::new("1", "Junior  Brief"),
            CatalogProduct::new("2", "Boys Pants"),
        ];
        let misses = exact_name_misses(&products, &tree);
        assert_eq!(misses.len(), 1);
        assert_eq!(misses[0].id, "2");
    }
}
