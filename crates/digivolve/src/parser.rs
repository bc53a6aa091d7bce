use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use crate::types::{EvolutionRecord, Strategy};
use crate::utils::normalize_whitespace;

const HATCH_MARKER: &str = "can hatch from";
const EVOLVES_FROM: &str = "evolves from";
const EVOLVES_TO: &str = "evolves to";
const EXCLUDED_LINKS: [&str; 2] = ["/elements", "planner"];

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("invalid selector")
}

static SEL_BOX: LazyLock<Selector> = LazyLock::new(|| selector(".box"));
static SEL_P: LazyLock<Selector> = LazyLock::new(|| selector("p"));
static SEL_COLUMN: LazyLock<Selector> = LazyLock::new(|| selector(".columns .columns__item"));
static SEL_CAPTION_LINK: LazyLock<Selector> = LazyLock::new(|| selector("caption a"));
static SEL_CAPTION: LazyLock<Selector> = LazyLock::new(|| selector("caption"));
static SEL_TABLE: LazyLock<Selector> = LazyLock::new(|| selector("table"));
static SEL_ROW: LazyLock<Selector> = LazyLock::new(|| selector("tr"));
static SEL_TH: LazyLock<Selector> = LazyLock::new(|| selector("th"));
static SEL_TD: LazyLock<Selector> = LazyLock::new(|| selector("td"));
static SEL_CELL: LazyLock<Selector> = LazyLock::new(|| selector("th, td"));
static SEL_LINK: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));
static SEL_HEADING: LazyLock<Selector> = LazyLock::new(|| selector("h2, h3, h4"));

fn elem_text(element: ElementRef) -> String {
    normalize_whitespace(&element.text().collect::<String>())
}

fn is_heading(element: &ElementRef) -> bool {
    matches!(element.value().name(), "h1" | "h2" | "h3" | "h4")
}

/// Runs `strategy` against a rendered page for the entity called `name`.
///
/// A page without the expected section yields an empty vector. Malformed
/// rows and captions are skipped rather than reported.
pub fn extract(html: &str, name: &str, strategy: Strategy) -> Vec<EvolutionRecord> {
    let document = Html::parse_document(html);
    match strategy {
        Strategy::Requirements => parse_requirements(&document, name),
        Strategy::Hatching => parse_hatching(&document, name),
        Strategy::Links => parse_links(&document, name),
    }
}

fn find_requirements_box(document: &Html) -> Option<ElementRef<'_>> {
    document.select(&SEL_BOX).find(|block| {
        block
            .select(&SEL_P)
            .next()
            .map(|p| elem_text(p).to_lowercase())
            .is_some_and(|intro| intro.contains("evolution") && intro.contains("requirement"))
    })
}

pub fn parse_requirements(document: &Html, name: &str) -> Vec<EvolutionRecord> {
    let Some(block) = find_requirements_box(document) else {
        log::debug!("No evolution requirements box for {}", name);
        return Vec::new();
    };

    let mut records = Vec::new();
    for column in block.select(&SEL_COLUMN) {
        let Some(caption) = column.select(&SEL_CAPTION_LINK).next() else {
            log::debug!("Skipping column without a caption link on {}", name);
            continue;
        };
        let from = elem_text(caption);

        let requirements = column
            .select(&SEL_ROW)
            .filter_map(|row| {
                let label = row.select(&SEL_TH).next().map(elem_text)?;
                let value = row.select(&SEL_TD).next().map(elem_text)?;
                Some(format!("{} {}", label, value))
            })
            .collect();

        records.push(EvolutionRecord::new(from, name, requirements));
    }

    records
}

pub fn parse_hatching(document: &Html, name: &str) -> Vec<EvolutionRecord> {
    let section = document.select(&SEL_TABLE).find(|table| {
        table
            .select(&SEL_CAPTION)
            .next()
            .is_some_and(|caption| elem_text(caption).to_lowercase().contains(HATCH_MARKER))
    });

    let Some(section) = section else {
        log::debug!("No hatching table for {}", name);
        return Vec::new();
    };

    section
        .select(&SEL_ROW)
        .filter_map(|row| {
            let cell = row.select(&SEL_CELL).nth(1)?;
            let link = cell.select(&SEL_LINK).next()?;
            let from = elem_text(link);
            (!from.is_empty()).then(|| EvolutionRecord::new(from, name, Vec::new()))
        })
        .collect()
}

#[derive(Clone, Copy)]
enum Direction {
    From,
    To,
}

fn heading_direction(heading: ElementRef) -> Option<Direction> {
    let text = elem_text(heading).to_lowercase();
    if text.contains(EVOLVES_FROM) {
        Some(Direction::From)
    } else if text.contains(EVOLVES_TO) {
        Some(Direction::To)
    } else {
        None
    }
}

fn is_excluded(href: &str) -> bool {
    EXCLUDED_LINKS.iter().any(|pattern| href.contains(pattern))
}

/// Reads the sibling links under the "Evolves from" and "Evolves to"
/// headings. Links to the elements reference page and the planner tool are
/// not entities.
pub fn parse_links(document: &Html, name: &str) -> Vec<EvolutionRecord> {
    let mut records = Vec::new();

    for heading in document.select(&SEL_HEADING) {
        let Some(direction) = heading_direction(heading) else {
            continue;
        };

        let mut seen = HashSet::new();
        let siblings = heading
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .take_while(|sibling| !is_heading(sibling));

        for sibling in siblings {
            let own_link = (sibling.value().name() == "a").then_some(sibling);
            for link in own_link.into_iter().chain(sibling.select(&SEL_LINK)) {
                let href = link.value().attr("href").unwrap_or_default();
                if is_excluded(href) {
                    continue;
                }
                let other = elem_text(link);
                if other.is_empty() || !seen.insert(other.clone()) {
                    continue;
                }
                records.push(match direction {
                    Direction::From => EvolutionRecord::new(other, name, Vec::new()),
                    Direction::To => EvolutionRecord::new(name, other, Vec::new()),
                });
            }
        }
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const GREYMON_PAGE: &str = r#"
        <html><body>
          <div class="box"><p>Greymon is a Champion level Digimon.</p></div>
          <div class="box">
            <p>The following evolution requirements must be met.</p>
            <div class="columns">
              <div class="columns__item">
                <table>
                  <caption><a href="/digimon/agumon">Agumon</a></caption>
                  <tr><th>Level</th><td>15</td></tr>
                </table>
              </div>
              <div class="columns__item">
                <table>
                  <caption><a href="/digimon/gabumon">Gabumon</a></caption>
                </table>
              </div>
            </div>
          </div>
        </body></html>
    "#;

    #[test]
    fn test_requirements_two_columns() {
        let records = extract(GREYMON_PAGE, "Greymon", Strategy::Requirements);

        assert_eq!(
            records,
            vec![
                EvolutionRecord::new("Agumon", "Greymon", vec!["Level 15".to_string()]),
                EvolutionRecord::new("Gabumon", "Greymon", vec![]),
            ]
        );
    }

    #[test]
    fn test_requirements_no_matching_section() {
        let html = r#"<div class="box"><p>Nothing to see here.</p></div>"#;
        assert!(extract(html, "Greymon", Strategy::Requirements).is_empty());
        assert!(extract("", "Greymon", Strategy::Requirements).is_empty());
    }

    #[test]
    fn test_requirements_skips_incomplete_rows() {
        let html = r#"
            <div class="box">
              <p>Evolution requirements</p>
              <div class="columns"><div class="columns__item">
                <table>
                  <caption><a href="/digimon/agumon">Agumon</a></caption>
                  <tr><th>Level</th></tr>
                  <tr><td>orphan value</td></tr>
                  <tr><th>Friendship</th><td>50%</td></tr>
                </table>
              </div></div>
            </div>
        "#;

        let records = extract(html, "Greymon", Strategy::Requirements);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].requirements, vec!["Friendship 50%".to_string()]);
    }

    #[test]
    fn test_requirements_skips_caption_without_link() {
        let html = r#"
            <div class="box">
              <p>evolution requirement</p>
              <div class="columns">
                <div class="columns__item">
                  <table><caption>Unknown</caption><tr><th>Level</th><td>3</td></tr></table>
                </div>
                <div class="columns__item">
                  <table><caption><a href="/x">Koromon</a></caption></table>
                </div>
              </div>
            </div>
        "#;

        let records = extract(html, "Agumon", Strategy::Requirements);
        assert_eq!(records, vec![EvolutionRecord::new("Koromon", "Agumon", vec![])]);
    }

    #[test]
    fn test_requirements_from_fixture() {
        let html = fs::read_to_string("fixtures/wargreymon.html").expect("Failed to read fixture");

        let records = extract(&html, "WarGreymon", Strategy::Requirements);

        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.to == "WarGreymon"));
        assert_eq!(records[0].from, "MetalGreymon");
        assert_eq!(
            records[0].requirements,
            vec!["Level 45".to_string(), "Attack 300".to_string()]
        );
        assert_eq!(records[2].from, "MetalGreymon (Virus)");
        assert!(records[2].requirements.is_empty());
    }

    #[test]
    fn test_hatching_rows() {
        let html = r#"
            <table>
              <caption>Other eggs</caption>
              <tr><td>1</td><td><a href="/eggs/blue">Blue Egg</a></td></tr>
            </table>
            <table>
              <caption>Koromon can hatch from</caption>
              <tr><th>#</th><th>Egg</th></tr>
              <tr><td>1</td><td><a href="/eggs/orange">Orange Egg</a></td></tr>
              <tr><td>2</td><td>No link here</td></tr>
              <tr><td>3</td><td><a href="/eggs/red">Red  Egg</a></td></tr>
            </table>
        "#;

        let records = extract(html, "Koromon", Strategy::Hatching);
        assert_eq!(
            records,
            vec![
                EvolutionRecord::new("Orange Egg", "Koromon", vec![]),
                EvolutionRecord::new("Red Egg", "Koromon", vec![]),
            ]
        );
    }

    #[test]
    fn test_hatching_row_with_header_cell() {
        let html = r#"
            <table>
              <caption>Punimon can hatch from</caption>
              <tr><th>#</th><th>Egg</th></tr>
              <tr><th>1</th><td><a href="/eggs/yellow">Yellow Egg</a></td></tr>
              <tr><td>2</td><td><a href="/eggs/green">Green Egg</a></td></tr>
            </table>
        "#;

        let records = extract(html, "Punimon", Strategy::Hatching);
        assert_eq!(
            records,
            vec![
                EvolutionRecord::new("Yellow Egg", "Punimon", vec![]),
                EvolutionRecord::new("Green Egg", "Punimon", vec![]),
            ]
        );
    }

    #[test]
    fn test_hatching_from_fixture() {
        let html = fs::read_to_string("fixtures/botamon.html").expect("Failed to read fixture");

        let records = extract(&html, "Botamon", Strategy::Hatching);
        let froms: Vec<_> = records.iter().map(|r| r.from.as_str()).collect();
        assert_eq!(froms, vec!["Digitama", "Ancient Digitama"]);
        assert!(records.iter().all(|r| r.requirements.is_empty()));
    }

    #[test]
    fn test_hatching_missing_section() {
        assert!(extract(GREYMON_PAGE, "Greymon", Strategy::Hatching).is_empty());
    }

    #[test]
    fn test_links_both_directions() {
        let html = r#"
            <h2>Evolves from</h2>
            <ul>
              <li><a href="/digimon/agumon">Agumon</a></li>
              <li><a href="/digimon/agumon">Agumon</a></li>
              <li><a href="/elements/fire">Fire</a></li>
            </ul>
            <h2>Evolves to</h2>
            <p><a href="/digimon/metalgreymon">MetalGreymon</a></p>
            <a href="/tools/evolution-planner">Open in planner</a>
            <a href="/digimon/skullgreymon">SkullGreymon</a>
            <h2>Locations</h2>
            <p><a href="/maps/file-island">File Island</a></p>
        "#;

        let records = extract(html, "Greymon", Strategy::Links);
        assert_eq!(
            records,
            vec![
                EvolutionRecord::new("Agumon", "Greymon", vec![]),
                EvolutionRecord::new("Greymon", "MetalGreymon", vec![]),
                EvolutionRecord::new("Greymon", "SkullGreymon", vec![]),
            ]
        );
    }

    #[test]
    fn test_links_preserves_non_ascii() {
        let html = r#"<h3>Evolves to</h3><div><a href="/d/1">オメガモン</a></div>"#;
        let records = extract(html, "ウォーグレイモン", Strategy::Links);
        assert_eq!(
            records,
            vec![EvolutionRecord::new("ウォーグレイモン", "オメガモン", vec![])]
        );
    }
}
