use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Few-NERD label granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Coarse,
    Fine,
}

impl Granularity {
    /// Column holding the tag indices in the Few-NERD export.
    pub fn tag_key(&self) -> &'static str {
        match self {
            Granularity::Coarse => "ner_tags",
            Granularity::Fine => "fine_ner_tags",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Coarse => "coarse",
            Granularity::Fine => "fine",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "coarse" => Ok(Granularity::Coarse),
            "fine" => Ok(Granularity::Fine),
            other => Err(format!("unknown granularity '{other}' (expected coarse|fine)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityType {
    pub id: String,
    pub description: String,
    pub parent: Option<String>,
}

/// The ordered set of entity types a prompt asks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySchema {
    pub granularity: Granularity,
    pub types: Vec<EntityType>,
}

const COARSE_TYPES: &[(&str, &str)] = &[
    ("art", "Refers to creative works and titles, including magazines, films, plays, operas, and television shows."),
    ("building", "Refers to man-made structures and facilities, such as museums, airports, and sports arenas."),
    ("event", "Refers to historical occurrences, revolutions, social movements, or specific organized activities and stages."),
    ("location", "Refers to geographical entities, including countries, regions, cities, bodies of water, and geopolitical areas."),
    ("organization", "Refers to collective groups of people, including international agencies, commercial companies, sports teams, and leagues."),
    ("other", "Refers to entities that do not fit into standard categories, including biological terms (proteins, domains), languages, and chemical elements."),
    ("person", "Refers to individual human beings, including historical figures, authors, directors, and fictional characters."),
    ("product", "Refers to manufactured items, specifically vehicle models, concept cars, or specific mechanical objects."),
];

const FINE_TYPES: &[(&str, &str)] = &[
    ("art-broadcastprogram", "Refers to television or radio broadcast programs, including game shows, talk shows, and series."),
    ("art-film", "Refers to movies or films of any genre."),
    ("art-music", "Refers to musical compositions, songs, albums, or scores."),
    ("art-other", "Refers to other forms of art not covered by specific categories, such as sculptures or broadcast segments."),
    ("art-painting", "Refers to paintings, drawings, graffiti, or specific lens series named as art products."),
    ("art-writtenart", "Refers to written works like magazines, novels, plays, operas, or academic theses."),
    ("building-airport", "Refers to airports and aviation hubs."),
    ("building-hospital", "Refers to hospitals, medical centers, and clinical facilities."),
    ("building-hotel", "Refers to hotels, resorts, and lodging establishments."),
    ("building-library", "Refers to libraries and national or state archives."),
    ("building-other", "Refers to various buildings and structures such as museums, recording studios, churches, or manors."),
    ("building-restaurant", "Refers to dining establishments, halls, or delis."),
    ("building-sportsfacility", "Refers to stadiums, gardens, or arenas designed for sports and events."),
    ("building-theater", "Refers to theaters, opera houses, or performance spaces."),
    ("event-attack/battle/war/militaryconflict", "Refers to wars, military operations, battles, and general military conflicts."),
    ("event-disaster", "Refers to natural disasters, famines, or significant accidents."),
    ("event-election", "Refers to political elections, by-elections, or parliamentary votes."),
    ("event-other", "Refers to movements, campaigns, or institutional milestones categorized as events."),
    ("event-protest", "Refers to revolutions, rebellions, boycotts, or organized protests."),
    ("event-sportsevent", "Refers to sports tournaments, championships, or specific matches."),
    ("location-GPE", "Refers to Geopolitical Entities such as countries, cities, states, or districts."),
    ("location-bodiesofwater", "Refers to bodies of water like lakes, rivers, kills, or seas."),
    ("location-island", "Refers to islands, archipelagos, or peninsulas."),
    ("location-mountain", "Refers to mountains, ridges, glaciers, or mountain ranges."),
    ("location-other", "Refers to specific locations, transit lines, or estates not falling under common categories."),
    ("location-park", "Refers to parks, national parks, or community complexes."),
    ("location-road/railway/highway/transit", "Refers to roads, bridges, rail lines, or transit systems."),
    ("organization-company", "Refers to commercial companies and corporate entities."),
    ("organization-education", "Refers to educational institutions like universities, colleges, or academies."),
    ("organization-government/governmentagency", "Refers to government bodies, courts, police departments, or legislative assemblies."),
    ("organization-media/newspaper", "Refers to media outlets, news organizations, or magazines."),
    ("organization-other", "Refers to various organizations like military units, international agencies, or specific groups."),
    ("organization-politicalparty", "Refers to political parties or associations."),
    ("organization-religion", "Refers to religious denominations, churches, or faith-based groups."),
    ("organization-showorganization", "Refers to musical groups, bands, or orchestras."),
    ("organization-sportsleague", "Refers to sports leagues or divisions."),
    ("organization-sportsteam", "Refers to professional or national sports teams."),
    ("other-astronomything", "Refers to celestial bodies, constellations, or astronomical concepts."),
    ("other-award", "Refers to awards, honors, or prizes."),
    ("other-biologything", "Refers to biological entities such as proteins, domains, or species classifications."),
    ("other-chemicalthing", "Refers to chemical elements, compounds, or atmospheres."),
    ("other-currency", "Refers to monetary units or specific currency amounts."),
    ("other-disease", "Refers to medical conditions, diseases, or physiological states."),
    ("other-educationaldegree", "Refers to academic degrees or titles."),
    ("other-god", "Refers to deities, religious figures, or gods."),
    ("other-language", "Refers to languages or language-based names."),
    ("other-law", "Refers to acts, treaties, statutes, or legal agreements."),
    ("other-livingthing", "Refers to animals, plants, or biological families."),
    ("other-medical", "Refers to medical fields, treatments, or pharmaceuticals."),
    ("person-actor", "Refers to actors or performers in film and theater."),
    ("person-artist/author", "Refers to writers, composers, lyricists, or artists."),
    ("person-athlete", "Refers to sports professionals, cyclists, or players."),
    ("person-director", "Refers to film or theater directors."),
    ("person-other", "Refers to notable individuals not classified into other specialized categories."),
    ("person-politician", "Refers to political leaders, monarchs, or congressmen."),
    ("person-scholar", "Refers to academics, researchers, or scientists."),
    ("person-soldier", "Refers to military personnel, commanders, or generals."),
    ("product-airplane", "Refers to aircraft, helicopters, or fighter jets."),
    ("product-car", "Refers to automobiles and concept cars."),
    ("product-food", "Refers to food items, agricultural products, or specific grape varieties used for wine."),
    ("product-game", "Refers to video games, gaming consoles, or specific handheld models."),
    ("product-other", "Refers to various physical products like computers, cryptographic devices, or engines."),
    ("product-ship", "Refers to ships, vessels, frigates, or submersibles."),
    ("product-software", "Refers to software, websites, or development tools."),
    ("product-train", "Refers to trains, locomotives, or hybrid vehicle engines."),
    ("product-weapon", "Refers to weapons, rifles, or artillery."),
];

/// The tag every non-entity token carries.
pub const OUTSIDE_TAG: &str = "O";

impl EntitySchema {
    /// Built-in schema with the guideline descriptions.
    pub fn builtin(granularity: Granularity) -> Self {
        let table = match granularity {
            Granularity::Coarse => COARSE_TYPES,
            Granularity::Fine => FINE_TYPES,
        };

        let types = table
            .iter()
            .map(|(id, description)| EntityType {
                id: id.to_string(),
                description: description.to_string(),
                parent: parent_of(granularity, id),
            })
            .collect();

        Self { granularity, types }
    }

    /// Schema for the labels of a tag table, in table order.
    ///
    /// Labels without a built-in description fall back to their parent's
    /// coarse description, then to a generic sentence.
    pub fn from_tag_names(granularity: Granularity, tag_names: &[String]) -> Self {
        let builtin = Self::builtin(granularity);
        let coarse = Self::builtin(Granularity::Coarse);

        let types = tag_names
            .iter()
            .filter(|name| name.as_str() != OUTSIDE_TAG)
            .map(|name| {
                if let Some(known) = builtin.get(name) {
                    return known.clone();
                }
                let parent = parent_of(granularity, name);
                let description = parent
                    .as_deref()
                    .and_then(|p| coarse.get(p))
                    .map(|t| t.description.clone())
                    .unwrap_or_else(|| format!("Entities categorized as {name}"));
                EntityType {
                    id: name.clone(),
                    description,
                    parent,
                }
            })
            .collect();

        Self { granularity, types }
    }

    pub fn get(&self, id: &str) -> Option<&EntityType> {
        self.types.iter().find(|t| t.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn type_ids(&self) -> impl Iterator<Item = &str> {
        self.types.iter().map(|t| t.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

fn parent_of(granularity: Granularity, id: &str) -> Option<String> {
    match granularity {
        Granularity::Coarse => None,
        Granularity::Fine => id.split_once('-').map(|(parent, _)| parent.to_string()),
    }
}
