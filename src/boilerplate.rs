//! Paragraph-level boilerplate classification for raw page markup.
//!
//! The default [`ParagraphClassifier`] follows the jusText approach: the page
//! is cut into paragraphs at block-level tags, each paragraph is classified on
//! its own (length, stopword density, link density), and short or borderline
//! paragraphs are then revised from their neighbours.

use crate::stoplist::StopwordSet;
use scraper::node::Node;
use scraper::{ElementRef, Html};
use serde::Serialize;
use thiserror::Error;

const PARAGRAPH_TAGS: &[&str] = &[
    "blockquote", "body", "caption", "center", "col", "colgroup", "dd", "div", "dl", "dt",
    "fieldset", "form", "h1", "h2", "h3", "h4", "h5", "h6", "legend", "li", "optgroup", "option",
    "p", "pre", "table", "td", "textarea", "tfoot", "th", "thead", "tr", "ul",
];

const SKIPPED_TAGS: &[&str] = &[
    "applet", "embed", "head", "iframe", "noscript", "object", "script", "style", "svg",
    "template",
];

const HEADING_TAGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6"];

/// Thresholds for paragraph classification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JustextConfig {
    /// Paragraphs shorter than this (in chars) are `Short`.
    pub length_low: usize,
    /// Stopword-rich paragraphs longer than this are `Good`.
    pub length_high: usize,
    /// Minimum stopword density for `NearGood`.
    pub stopwords_low: f64,
    /// Minimum stopword density for `Good`.
    pub stopwords_high: f64,
    /// Paragraphs with more link text than this ratio are `Bad`.
    pub max_link_density: f64,
    /// How far (in chars) a short heading looks ahead for good content.
    pub max_heading_distance: usize,
    /// Skip the heading-specific revisions.
    pub no_headings: bool,
}

impl Default for JustextConfig {
    /// The fixed configuration used by the extraction pipeline.
    fn default() -> Self {
        Self {
            length_low: 40,
            length_high: 250,
            stopwords_low: 0.3,
            stopwords_high: 0.1,
            max_link_density: 0.2,
            max_heading_distance: 3,
            no_headings: true,
        }
    }
}

/// Classification of one paragraph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParagraphClass {
    /// Main content.
    Good,
    /// Borderline; settled by neighbours.
    NearGood,
    /// Too short to judge alone; settled by neighbours.
    Short,
    /// Boilerplate.
    Bad,
}

/// A text paragraph cut out of the markup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Paragraph {
    /// Whitespace-normalized text.
    pub text: String,
    /// Dot-joined element path at the paragraph start, e.g. `html.body.div.p`.
    pub dom_path: String,
    /// True when the paragraph sits inside `h1`..`h6`.
    pub heading: bool,
    /// Characters of text inside `<a>` elements.
    pub chars_in_links: usize,
    /// Inline tags seen inside the paragraph.
    pub tags: usize,
    /// Classification before neighbour revision.
    pub cf_class: ParagraphClass,
    /// Final classification.
    pub class: ParagraphClass,
}

impl Paragraph {
    /// Anything not finally classified as `Good` is boilerplate.
    pub fn is_boilerplate(&self) -> bool {
        self.class != ParagraphClass::Good
    }

    fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    fn stopword_density(&self, stopwords: &StopwordSet) -> f64 {
        let mut words = 0usize;
        let mut hits = 0usize;
        for word in self.text.split_whitespace() {
            words += 1;
            if stopwords.contains(word) {
                hits += 1;
            }
        }
        if words == 0 {
            0.0
        } else {
            hits as f64 / words as f64
        }
    }

    fn link_density(&self) -> f64 {
        let len = self.char_len();
        if len == 0 {
            0.0
        } else {
            self.chars_in_links as f64 / len as f64
        }
    }
}

/// Errors surfaced by a boilerplate remover.
#[derive(Debug, Error)]
pub enum BoilerplateError {
    /// Nothing to parse.
    #[error("document is empty")]
    EmptyDocument,
    /// Implementation-specific failure.
    #[error("boilerplate removal failed: {0}")]
    Failed(String),
}

/// Splits markup into labelled paragraphs.
pub trait BoilerplateRemover: Send + Sync {
    /// Returns every paragraph in document order with its final class.
    fn classify(
        &self,
        html: &str,
        stopwords: &StopwordSet,
        config: &JustextConfig,
    ) -> Result<Vec<Paragraph>, BoilerplateError>;
}

/// jusText-style classifier over a `scraper` DOM.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParagraphClassifier;

impl BoilerplateRemover for ParagraphClassifier {
    fn classify(
        &self,
        html: &str,
        stopwords: &StopwordSet,
        config: &JustextConfig,
    ) -> Result<Vec<Paragraph>, BoilerplateError> {
        if html.trim().is_empty() {
            return Err(BoilerplateError::EmptyDocument);
        }
        let document = Html::parse_document(html);
        let mut maker = ParagraphMaker::default();
        maker.walk(document.root_element());
        let mut paragraphs = maker.finish();

        for paragraph in &mut paragraphs {
            paragraph.cf_class = classify_context_free(paragraph, stopwords, config);
            paragraph.class = paragraph.cf_class;
        }
        if !config.no_headings {
            promote_short_headings(&mut paragraphs, config.max_heading_distance);
        }
        revise_short(&mut paragraphs);
        revise_near_good(&mut paragraphs);
        if !config.no_headings {
            restore_bad_headings(&mut paragraphs, config.max_heading_distance);
        }
        Ok(paragraphs)
    }
}

#[derive(Default)]
struct ParagraphMaker {
    paragraphs: Vec<Paragraph>,
    path: Vec<String>,
    text: String,
    dom_path: String,
    chars_in_links: usize,
    tags: usize,
    link_depth: usize,
    after_br: bool,
}

enum Step<'a> {
    Enter(ElementRef<'a>),
    Text(&'a str),
    Leave { link: bool, block: bool },
}

impl ParagraphMaker {
    /// Depth-first walk over an explicit stack of steps.
    fn walk(&mut self, root: ElementRef<'_>) {
        let mut stack = vec![Step::Enter(root)];
        while let Some(step) = stack.pop() {
            match step {
                Step::Text(text) => self.push_text(text),
                Step::Leave { link, block } => self.leave(link, block),
                Step::Enter(element) => {
                    let Some((link, block)) = self.enter(element.value().name()) else {
                        continue;
                    };
                    stack.push(Step::Leave { link, block });
                    let children: Vec<_> = element.children().collect();
                    for child in children.into_iter().rev() {
                        match child.value() {
                            Node::Text(text) => stack.push(Step::Text(&**text)),
                            Node::Element(_) => {
                                if let Some(child) = ElementRef::wrap(child) {
                                    stack.push(Step::Enter(child));
                                }
                            }
                            _ => {}
                        }
                    }
                }
            }
        }
    }

    /// Opens an element; `None` when its subtree is not descended into.
    fn enter(&mut self, name: &str) -> Option<(bool, bool)> {
        if SKIPPED_TAGS.contains(&name) {
            return None;
        }
        if name == "br" {
            if self.after_br {
                self.start_paragraph();
            } else {
                self.tags += 1;
                self.text.push(' ');
            }
            self.after_br = true;
            return None;
        }

        self.path.push(name.to_string());
        let block = PARAGRAPH_TAGS.contains(&name);
        if block {
            self.start_paragraph();
        } else {
            self.after_br = false;
            self.tags += 1;
        }
        let link = name == "a";
        if link {
            self.link_depth += 1;
        }
        Some((link, block))
    }

    fn leave(&mut self, link: bool, block: bool) {
        if link {
            self.link_depth -= 1;
        }
        self.path.pop();
        if block {
            self.start_paragraph();
        }
    }

    fn push_text(&mut self, text: &str) {
        let collapsed = collapse_whitespace(text);
        if collapsed.trim().is_empty() {
            self.text.push_str(&collapsed);
            return;
        }
        self.after_br = false;
        if self.link_depth > 0 {
            self.chars_in_links += collapsed.chars().count();
        }
        self.text.push_str(&collapsed);
    }

    fn start_paragraph(&mut self) {
        let text = collapse_whitespace(&self.text).trim().to_string();
        if !text.is_empty() {
            let heading = self
                .dom_path
                .split('.')
                .any(|segment| HEADING_TAGS.contains(&segment));
            self.paragraphs.push(Paragraph {
                text,
                dom_path: self.dom_path.clone(),
                heading,
                chars_in_links: self.chars_in_links,
                tags: self.tags,
                cf_class: ParagraphClass::Bad,
                class: ParagraphClass::Bad,
            });
        }
        self.text.clear();
        self.chars_in_links = 0;
        self.tags = 0;
        self.dom_path = self.path.join(".");
    }

    fn finish(mut self) -> Vec<Paragraph> {
        self.start_paragraph();
        self.paragraphs
    }
}

/// Collapses each whitespace run to one space, or to a newline when the run
/// contains a line break.
fn collapse_whitespace(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut run: Option<char> = None;
    for ch in input.chars() {
        if ch.is_whitespace() {
            let breaks = ch == '\n' || ch == '\r';
            if breaks || run.is_none() {
                run = Some(if breaks { '\n' } else { ' ' });
            }
        } else {
            if let Some(separator) = run.take() {
                out.push(separator);
            }
            out.push(ch);
        }
    }
    if let Some(separator) = run {
        out.push(separator);
    }
    out
}

fn classify_context_free(
    paragraph: &Paragraph,
    stopwords: &StopwordSet,
    config: &JustextConfig,
) -> ParagraphClass {
    let length = paragraph.char_len();
    let stopword_density = paragraph.stopword_density(stopwords);

    if paragraph.link_density() > config.max_link_density {
        ParagraphClass::Bad
    } else if paragraph.text.contains('\u{a9}') || paragraph.text.contains("&copy") {
        ParagraphClass::Bad
    } else if paragraph.dom_path.split('.').any(|segment| segment == "select") {
        ParagraphClass::Bad
    } else if length < config.length_low {
        if paragraph.chars_in_links > 0 {
            ParagraphClass::Bad
        } else {
            ParagraphClass::Short
        }
    } else if stopword_density >= config.stopwords_high {
        if length > config.length_high {
            ParagraphClass::Good
        } else {
            ParagraphClass::NearGood
        }
    } else if stopword_density >= config.stopwords_low {
        ParagraphClass::NearGood
    } else {
        ParagraphClass::Bad
    }
}

/// Class of the nearest paragraph that is neither `Short` nor (optionally)
/// `NearGood`; document edges count as `Bad`.
fn neighbour(
    classes: &[ParagraphClass],
    index: usize,
    forward: bool,
    ignore_near_good: bool,
) -> ParagraphClass {
    let skip = |class: &&ParagraphClass| {
        **class == ParagraphClass::Short
            || (ignore_near_good && **class == ParagraphClass::NearGood)
    };
    let found = if forward {
        classes[index + 1..].iter().find(|class| !skip(class))
    } else {
        classes[..index].iter().rev().find(|class| !skip(class))
    };
    found.copied().unwrap_or(ParagraphClass::Bad)
}

fn revise_short(paragraphs: &mut [Paragraph]) {
    let classes: Vec<ParagraphClass> = paragraphs.iter().map(|p| p.class).collect();
    for (index, paragraph) in paragraphs.iter_mut().enumerate() {
        if classes[index] != ParagraphClass::Short {
            continue;
        }
        let prev = neighbour(&classes, index, false, true);
        let next = neighbour(&classes, index, true, true);
        paragraph.class = match (prev, next) {
            (ParagraphClass::Good, ParagraphClass::Good) => ParagraphClass::Good,
            (ParagraphClass::Bad, ParagraphClass::Bad) => ParagraphClass::Bad,
            _ => {
                let near_good_before = prev == ParagraphClass::Bad
                    && neighbour(&classes, index, false, false) == ParagraphClass::NearGood;
                let near_good_after = next == ParagraphClass::Bad
                    && neighbour(&classes, index, true, false) == ParagraphClass::NearGood;
                if near_good_before || near_good_after {
                    ParagraphClass::Good
                } else {
                    ParagraphClass::Bad
                }
            }
        };
    }
}

fn revise_near_good(paragraphs: &mut [Paragraph]) {
    for index in 0..paragraphs.len() {
        if paragraphs[index].class != ParagraphClass::NearGood {
            continue;
        }
        let classes: Vec<ParagraphClass> = paragraphs.iter().map(|p| p.class).collect();
        let prev = neighbour(&classes, index, false, true);
        let next = neighbour(&classes, index, true, true);
        paragraphs[index].class = if prev == ParagraphClass::Bad && next == ParagraphClass::Bad {
            ParagraphClass::Bad
        } else {
            ParagraphClass::Good
        };
    }
}

fn good_content_follows(paragraphs: &[Paragraph], index: usize, max_distance: usize) -> bool {
    let mut distance = 0usize;
    for following in &paragraphs[index + 1..] {
        if distance > max_distance {
            break;
        }
        if following.class == ParagraphClass::Good {
            return true;
        }
        distance += following.char_len();
    }
    false
}

fn promote_short_headings(paragraphs: &mut [Paragraph], max_distance: usize) {
    for index in 0..paragraphs.len() {
        let paragraph = &paragraphs[index];
        if paragraph.heading
            && paragraph.class == ParagraphClass::Short
            && good_content_follows(paragraphs, index, max_distance)
        {
            paragraphs[index].class = ParagraphClass::NearGood;
        }
    }
}

fn restore_bad_headings(paragraphs: &mut [Paragraph], max_distance: usize) {
    for index in 0..paragraphs.len() {
        let paragraph = &paragraphs[index];
        if paragraph.heading
            && paragraph.class == ParagraphClass::Bad
            && paragraph.cf_class != ParagraphClass::Bad
            && good_content_follows(paragraphs, index, max_distance)
        {
            paragraphs[index].class = ParagraphClass::Good;
        }
    }
}
