//! Species taxonomy: which model outputs belong to which crop.
//!
//! The classifier emits one score per PlantVillage class. A species owns an
//! ordered set of those classes (disease key → class index). Across the
//! taxonomy the species' index sets partition the model output space.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::marker::PhantomData;
use std::path::Path;

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};

use crate::utils::error::{DiagnosisError, Result, ResultExt};

/// Number of classes in the PlantVillage taxonomy
pub const NUM_CLASSES: usize = 38;

/// Separator between species and disease in PlantVillage class names
pub const CLASS_SEPARATOR: &str = "___";

/// PlantVillage class names in model output order.
/// Format: "Species___disease" or "Species___healthy"
pub const PLANTVILLAGE_CLASSES: [&str; NUM_CLASSES] = [
    "Apple___Apple_scab",                                   // 0
    "Apple___Black_rot",                                    // 1
    "Apple___Cedar_apple_rust",                             // 2
    "Apple___healthy",                                      // 3
    "Blueberry___healthy",                                  // 4
    "Cherry_(including_sour)___Powdery_mildew",             // 5
    "Cherry_(including_sour)___healthy",                    // 6
    "Corn_(maize)___Cercospora_leaf_spot Gray_leaf_spot",   // 7
    "Corn_(maize)___Common_rust_",                          // 8
    "Corn_(maize)___Northern_Leaf_Blight",                  // 9
    "Corn_(maize)___healthy",                               // 10
    "Grape___Black_rot",                                    // 11
    "Grape___Esca_(Black_Measles)",                         // 12
    "Grape___Leaf_blight_(Isariopsis_Leaf_Spot)",           // 13
    "Grape___healthy",                                      // 14
    "Orange___Haunglongbing_(Citrus_greening)",             // 15
    "Peach___Bacterial_spot",                               // 16
    "Peach___healthy",                                      // 17
    "Pepper,_bell___Bacterial_spot",                        // 18
    "Pepper,_bell___healthy",                               // 19
    "Potato___Early_blight",                                // 20
    "Potato___Late_blight",                                 // 21
    "Potato___healthy",                                     // 22
    "Raspberry___healthy",                                  // 23
    "Soybean___healthy",                                    // 24
    "Squash___Powdery_mildew",                              // 25
    "Strawberry___Leaf_scorch",                             // 26
    "Strawberry___healthy",                                 // 27
    "Tomato___Bacterial_spot",                              // 28
    "Tomato___Early_blight",                                // 29
    "Tomato___Late_blight",                                 // 30
    "Tomato___Leaf_Mold",                                   // 31
    "Tomato___Septoria_leaf_spot",                          // 32
    "Tomato___Spider_mites Two-spotted_spider_mite",        // 33
    "Tomato___Target_Spot",                                 // 34
    "Tomato___Tomato_Yellow_Leaf_Curl_Virus",               // 35
    "Tomato___Tomato_mosaic_virus",                         // 36
    "Tomato___healthy",                                     // 37
];

/// Turn a taxonomy key into a display label.
///
/// Underscores and `(),` become spaces, whitespace runs collapse, and every
/// word starts upper-case: `"Corn_(maize)"` → `"Corn Maize"`.
pub fn prettify_label(label: &str) -> String {
    let spaced: String = label
        .chars()
        .map(|c| if matches!(c, '_' | '(' | ')' | ',') { ' ' } else { c })
        .collect();
    let collapsed = spaced.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut out = String::with_capacity(collapsed.len());
    let mut prev_is_word = false;
    for c in collapsed.chars() {
        let is_word = c.is_ascii_alphanumeric();
        if is_word && !prev_is_word {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        prev_is_word = is_word;
    }
    out
}

/// Ordered disease → class-index mapping for one species
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeciesClassMap {
    key: String,
    diseases: Vec<(String, usize)>,
}

impl SpeciesClassMap {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn label(&self) -> String {
        prettify_label(&self.key)
    }

    /// (disease key, class index) pairs in taxonomy order
    pub fn diseases(&self) -> impl Iterator<Item = (&str, usize)> {
        self.diseases.iter().map(|(d, i)| (d.as_str(), *i))
    }

    pub fn len(&self) -> usize {
        self.diseases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diseases.is_empty()
    }

    /// Class indices this species may be classified as
    pub fn valid_indices(&self) -> BTreeSet<usize> {
        self.diseases.iter().map(|(_, i)| *i).collect()
    }

    /// Reverse lookup: which disease owns a class index
    pub fn disease_for(&self, class_index: usize) -> Option<&str> {
        self.diseases
            .iter()
            .find(|(_, i)| *i == class_index)
            .map(|(d, _)| d.as_str())
    }

    pub fn index_of(&self, disease: &str) -> Option<usize> {
        self.diseases
            .iter()
            .find(|(d, _)| d == disease)
            .map(|(_, i)| *i)
    }
}

/// Listing entry for one disease
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiseaseSummary {
    pub key: String,
    pub label: String,
    pub index: usize,
}

/// Listing entry for one species
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpeciesSummary {
    pub key: String,
    pub label: String,
    pub diseases: Vec<DiseaseSummary>,
}

/// Immutable species → disease → class-index lookup, loaded once at startup
#[derive(Debug, Clone)]
pub struct SpeciesTaxonomy {
    num_classes: usize,
    species: Vec<SpeciesClassMap>,
    by_key: HashMap<String, usize>,
}

impl SpeciesTaxonomy {
    /// The 38-class PlantVillage taxonomy
    pub fn plantvillage() -> Result<Self> {
        Self::from_class_names(&PLANTVILLAGE_CLASSES)
    }

    /// Build from `Species___disease` names; position is the class index
    pub fn from_class_names(names: &[&str]) -> Result<Self> {
        let mut entries: Vec<(String, Vec<(String, usize)>)> = Vec::new();

        for (index, name) in names.iter().enumerate() {
            let (species, disease) = name.split_once(CLASS_SEPARATOR).ok_or_else(|| {
                DiagnosisError::TaxonomyInconsistency(format!(
                    "class name '{}' has no '{}' separator",
                    name, CLASS_SEPARATOR
                ))
            })?;

            match entries.iter_mut().find(|(s, _)| s == species) {
                Some((_, diseases)) => diseases.push((disease.to_string(), index)),
                None => entries.push((species.to_string(), vec![(disease.to_string(), index)])),
            }
        }

        Self::from_entries(entries, names.len())
    }

    /// Build and validate from ordered (species, [(disease, index)]) entries
    pub fn from_entries(
        entries: Vec<(String, Vec<(String, usize)>)>,
        num_classes: usize,
    ) -> Result<Self> {
        let mut seen_indices: HashMap<usize, (String, String)> = HashMap::new();
        let mut by_key = HashMap::with_capacity(entries.len());
        let mut species = Vec::with_capacity(entries.len());

        for (key, diseases) in entries {
            if by_key.contains_key(&key) {
                return Err(DiagnosisError::TaxonomyInconsistency(format!(
                    "species '{}' is listed twice",
                    key
                )));
            }

            let mut seen_diseases = HashSet::with_capacity(diseases.len());
            for (disease, index) in &diseases {
                if !seen_diseases.insert(disease.as_str()) {
                    return Err(DiagnosisError::TaxonomyInconsistency(format!(
                        "disease '{}' is listed twice for species '{}'",
                        disease, key
                    )));
                }
                if *index >= num_classes {
                    return Err(DiagnosisError::TaxonomyInconsistency(format!(
                        "{}/{} maps to class {}, model has {} classes",
                        key, disease, index, num_classes
                    )));
                }
                if let Some((other_species, other_disease)) =
                    seen_indices.insert(*index, (key.clone(), disease.clone()))
                {
                    return Err(DiagnosisError::TaxonomyInconsistency(format!(
                        "class {} is claimed by both {}/{} and {}/{}",
                        index, other_species, other_disease, key, disease
                    )));
                }
            }

            by_key.insert(key.clone(), species.len());
            species.push(SpeciesClassMap { key, diseases });
        }

        if seen_indices.len() != num_classes {
            let missing: Vec<usize> = (0..num_classes)
                .filter(|i| !seen_indices.contains_key(i))
                .collect();
            return Err(DiagnosisError::TaxonomyInconsistency(format!(
                "classes {:?} belong to no species",
                missing
            )));
        }

        Ok(Self {
            num_classes,
            species,
            by_key,
        })
    }

    /// Parse a JSON manifest `{ "<species>": { "<disease>": <index> } }`
    pub fn from_json_str(json: &str, num_classes: usize) -> Result<Self> {
        let manifest: OrderedEntries<OrderedEntries<usize>> =
            serde_json::from_str(json).context("Invalid taxonomy manifest")?;

        let entries = manifest
            .0
            .into_iter()
            .map(|(species, diseases)| (species, diseases.0))
            .collect();
        Self::from_entries(entries, num_classes)
    }

    /// Load a JSON manifest from disk
    pub fn from_json_file(path: &Path, num_classes: usize) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read taxonomy manifest {}", path.display()))?;
        let taxonomy = Self::from_json_str(&content, num_classes)?;
        tracing::info!(
            path = %path.display(),
            species = taxonomy.species.len(),
            "loaded species taxonomy"
        );
        Ok(taxonomy)
    }

    /// Look up one species, failing with `UnknownSpecies`
    pub fn lookup(&self, species_key: &str) -> Result<&SpeciesClassMap> {
        self.by_key
            .get(species_key)
            .map(|&i| &self.species[i])
            .ok_or_else(|| DiagnosisError::UnknownSpecies(species_key.to_string()))
    }

    pub fn contains(&self, species_key: &str) -> bool {
        self.by_key.contains_key(species_key)
    }

    /// Size of the model output space this taxonomy partitions
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn species(&self) -> &[SpeciesClassMap] {
        &self.species
    }

    /// Species and disease keys with display labels, in taxonomy order
    pub fn summaries(&self) -> Vec<SpeciesSummary> {
        self.species
            .iter()
            .map(|s| SpeciesSummary {
                key: s.key.clone(),
                label: s.label(),
                diseases: s
                    .diseases()
                    .map(|(key, index)| DiseaseSummary {
                        key: key.to_string(),
                        label: prettify_label(key),
                        index,
                    })
                    .collect(),
            })
            .collect()
    }
}

/// JSON object read as an ordered list of entries, duplicates kept
struct OrderedEntries<V>(Vec<(String, V)>);

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedEntries<V> {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct EntriesVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for EntriesVisitor<V> {
            type Value = OrderedEntries<V>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON object")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, value)) = map.next_entry::<String, V>()? {
                    entries.push((key, value));
                }
                Ok(OrderedEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor(PhantomData))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_prettify_label() {
        assert_eq!(prettify_label("Corn_(maize)"), "Corn Maize");
        assert_eq!(prettify_label("Pepper,_bell"), "Pepper Bell");
        assert_eq!(prettify_label("Common_rust_"), "Common Rust");
        assert_eq!(prettify_label("healthy"), "Healthy");
        assert_eq!(
            prettify_label("Spider_mites Two-spotted_spider_mite"),
            "Spider Mites Two-Spotted Spider Mite"
        );
        assert_eq!(
            prettify_label("Cherry_(including_sour)"),
            "Cherry Including Sour"
        );
    }

    #[test]
    fn test_plantvillage_partition() {
        let taxonomy = SpeciesTaxonomy::plantvillage().unwrap();
        assert_eq!(taxonomy.num_classes(), 38);
        assert_eq!(taxonomy.species().len(), 14);

        let apple = taxonomy.lookup("Apple").unwrap();
        assert_eq!(apple.valid_indices(), BTreeSet::from([0, 1, 2, 3]));
        assert_eq!(apple.disease_for(2), Some("Cedar_apple_rust"));
        assert_eq!(apple.disease_for(4), None);

        let tomato = taxonomy.lookup("Tomato").unwrap();
        assert_eq!(tomato.len(), 10);
        assert_eq!(tomato.index_of("healthy"), Some(37));

        let total: usize = taxonomy.species().iter().map(|s| s.len()).sum();
        assert_eq!(total, 38);
    }

    #[test]
    fn test_unknown_species() {
        let taxonomy = SpeciesTaxonomy::plantvillage().unwrap();
        let err = taxonomy.lookup("Banana").unwrap_err();
        assert!(matches!(err, DiagnosisError::UnknownSpecies(ref k) if k == "Banana"));
        assert!(!taxonomy.contains("apple"));
    }

    #[test]
    fn test_json_manifest_preserves_order() {
        let json = r#"{
            "Zucchini": { "healthy": 2, "Mildew": 0 },
            "Apple": { "Scab": 1 }
        }"#;
        let taxonomy = SpeciesTaxonomy::from_json_str(json, 3).unwrap();
        let keys: Vec<&str> = taxonomy.species().iter().map(|s| s.key()).collect();
        assert_eq!(keys, vec!["Zucchini", "Apple"]);

        let diseases: Vec<(&str, usize)> = taxonomy.species()[0].diseases().collect();
        assert_eq!(diseases, vec![("healthy", 2), ("Mildew", 0)]);
    }

    #[test]
    fn test_index_reused_across_species() {
        let json = r#"{ "A": { "x": 0 }, "B": { "y": 0, "z": 1 } }"#;
        let err = SpeciesTaxonomy::from_json_str(json, 2).unwrap_err();
        assert!(matches!(err, DiagnosisError::TaxonomyInconsistency(_)));
    }

    #[test]
    fn test_disease_repeated_within_species() {
        let json = r#"{ "A": { "x": 0, "x": 1 } }"#;
        let err = SpeciesTaxonomy::from_json_str(json, 2).unwrap_err();
        assert!(err.to_string().contains("listed twice"));
    }

    #[test]
    fn test_partition_must_cover_all_classes() {
        let json = r#"{ "A": { "x": 0 } }"#;
        let err = SpeciesTaxonomy::from_json_str(json, 3).unwrap_err();
        assert!(err.to_string().contains("[1, 2]"));

        let json = r#"{ "A": { "x": 0, "y": 5 } }"#;
        assert!(SpeciesTaxonomy::from_json_str(json, 2).is_err());
    }

    #[test]
    fn test_malformed_manifest() {
        let err = SpeciesTaxonomy::from_json_str("[1, 2, 3]", 3).unwrap_err();
        assert!(matches!(err, DiagnosisError::Config(_)));
    }

    #[test]
    fn test_manifest_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "Fig": {{ "healthy": 0, "Rust": 1 }} }}"#).unwrap();
        let taxonomy = SpeciesTaxonomy::from_json_file(file.path(), 2).unwrap();
        assert_eq!(taxonomy.lookup("Fig").unwrap().index_of("Rust"), Some(1));

        let missing = SpeciesTaxonomy::from_json_file(Path::new("/no/such/manifest.json"), 2);
        assert!(matches!(missing, Err(DiagnosisError::Config(_))));
    }

    #[test]
    fn test_summaries() {
        let taxonomy = SpeciesTaxonomy::plantvillage().unwrap();
        let summaries = taxonomy.summaries();
        let corn = summaries.iter().find(|s| s.key == "Corn_(maize)").unwrap();
        assert_eq!(corn.label, "Corn Maize");
        assert_eq!(corn.diseases[1].label, "Common Rust");
        assert_eq!(corn.diseases[1].index, 8);
    }
}
