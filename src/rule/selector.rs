//! Selectors: the address under which a rule matches an item.
//!
//! The cascade that *matches* selectors against an item tree lives upstream;
//! this crate only carries a selector with each rule, compares selectors, and
//! exposes their [`Specificity`] so the upstream cascade can order rules.
//!
//! Token priority in logos is determined by longest-match-first, so `.class`
//! and `#id` lex as single tokens rather than punctuation + identifier.

use std::fmt;
use std::str::FromStr;

use logos::Logos;

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// A single selector component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SelectorComponent {
    /// Type selector: matches an item type name (e.g. `Button`).
    Type(String),
    /// Universal selector: `*`.
    Universal,
    /// Class selector: `.classname`.
    Class(String),
    /// ID selector: `#id`.
    Id(String),
    /// Pseudo-class: `:hover`, `:focus`, etc.
    PseudoClass(String),
}

/// A compound selector: a sequence of components without combinators.
///
/// `Button.primary:hover` is one `Selector` with three components.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Selector {
    pub components: Vec<SelectorComponent>,
}

impl Selector {
    /// Create an empty selector (matches nothing upstream).
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a component (builder).
    pub fn with(mut self, component: SelectorComponent) -> Self {
        self.components.push(component);
        self
    }

    /// Returns `true` if this selector is the universal selector `*` alone.
    pub fn is_universal(&self) -> bool {
        self.components.len() == 1 && matches!(self.components[0], SelectorComponent::Universal)
    }

    /// Compute the specificity of this selector.
    pub fn specificity(&self) -> Specificity {
        let mut spec = Specificity::default();
        for component in &self.components {
            match component {
                SelectorComponent::Id(_) => spec.id_count += 1,
                SelectorComponent::Class(_) | SelectorComponent::PseudoClass(_) => {
                    spec.class_count += 1;
                }
                SelectorComponent::Type(_) => spec.type_count += 1,
                SelectorComponent::Universal => {
                    // Zero specificity.
                }
            }
        }
        spec
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for component in &self.components {
            match component {
                SelectorComponent::Type(name) => write!(f, "{name}")?,
                SelectorComponent::Universal => write!(f, "*")?,
                SelectorComponent::Class(name) => write!(f, ".{name}")?,
                SelectorComponent::Id(name) => write!(f, "#{name}")?,
                SelectorComponent::PseudoClass(name) => write!(f, ":{name}")?,
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Specificity
// ---------------------------------------------------------------------------

/// Selector specificity as a 3-tuple.
///
/// Derive `Ord` so that lexicographic comparison gives the cascade order:
/// more IDs beat more classes beat more types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Specificity {
    /// Number of ID selectors (`#id`).
    pub id_count: u16,
    /// Number of class + pseudo-class selectors (`.class`, `:hover`).
    pub class_count: u16,
    /// Number of type selectors (`Button`).
    pub type_count: u16,
}

// ---------------------------------------------------------------------------
// Lexer & parsing
// ---------------------------------------------------------------------------

/// Selector token produced by the lexer.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\n\r\f]+")]
enum Token {
    /// Class selector: `.primary`.
    #[regex(r"\.[a-zA-Z_][a-zA-Z0-9_-]*")]
    Class,

    /// ID selector: `#main`.
    #[regex(r"#[a-zA-Z_][a-zA-Z0-9_-]*")]
    Id,

    /// Pseudo-class: `:hover`.
    #[regex(r":[a-zA-Z][a-zA-Z0-9_-]*")]
    PseudoClass,

    /// Type selector: `Button`.
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_-]*")]
    Type,

    /// Universal selector `*`.
    #[token("*")]
    Star,
}

/// Error from selector parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid selector `{input}` at byte {at}")]
pub struct SelectorError {
    pub input: String,
    pub at: usize,
}

impl FromStr for Selector {
    type Err = SelectorError;

    /// Parse a compound selector like `Button.primary:hover` or `#main`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut selector = Selector::new();
        for (result, span) in Token::lexer(s).spanned() {
            let token = result.map_err(|()| SelectorError {
                input: s.to_string(),
                at: span.start,
            })?;
            let text = &s[span.clone()];
            let component = match token {
                Token::Class => SelectorComponent::Class(text[1..].to_string()),
                Token::Id => SelectorComponent::Id(text[1..].to_string()),
                Token::PseudoClass => SelectorComponent::PseudoClass(text[1..].to_string()),
                Token::Type => SelectorComponent::Type(text.to_string()),
                Token::Star => SelectorComponent::Universal,
            };
            selector.components.push(component);
        }
        Ok(selector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_type_selector() {
        let sel: Selector = "Button".parse().unwrap();
        assert_eq!(
            sel.components,
            vec![SelectorComponent::Type("Button".into())]
        );
    }

    #[test]
    fn parse_compound_selector() {
        let sel: Selector = "Button.primary:hover".parse().unwrap();
        assert_eq!(
            sel.components,
            vec![
                SelectorComponent::Type("Button".into()),
                SelectorComponent::Class("primary".into()),
                SelectorComponent::PseudoClass("hover".into()),
            ]
        );
    }

    #[test]
    fn parse_id_selector() {
        let sel: Selector = "#main".parse().unwrap();
        assert_eq!(sel.components, vec![SelectorComponent::Id("main".into())]);
    }

    #[test]
    fn parse_universal() {
        let sel: Selector = "*".parse().unwrap();
        assert!(sel.is_universal());
    }

    #[test]
    fn parse_invalid_is_error() {
        let err = "Button>".parse::<Selector>().unwrap_err();
        assert_eq!(err.at, 6);
    }

    #[test]
    fn display_round_trips() {
        for input in ["Button.primary:hover", "#main", "*", "Panel.nav"] {
            let sel: Selector = input.parse().unwrap();
            assert_eq!(sel.to_string(), input);
        }
    }

    #[test]
    fn builder_matches_parse() {
        let built = Selector::new()
            .with(SelectorComponent::Type("Button".into()))
            .with(SelectorComponent::Class("primary".into()));
        let parsed: Selector = "Button.primary".parse().unwrap();
        assert_eq!(built, parsed);
    }

    // ── Specificity ──────────────────────────────────────────────────

    #[test]
    fn specificity_counts_components() {
        let sel: Selector = "Button.primary.btn#save:hover".parse().unwrap();
        insta::assert_debug_snapshot!(sel.specificity(), @r###"
        Specificity {
            id_count: 1,
            class_count: 3,
            type_count: 1,
        }
        "###);
    }

    #[test]
    fn specificity_universal_is_zero() {
        let sel: Selector = "*".parse().unwrap();
        assert_eq!(sel.specificity(), Specificity::default());
    }

    #[test]
    fn specificity_ordering() {
        let id: Selector = "#main".parse().unwrap();
        let class: Selector = ".primary".parse().unwrap();
        let ty: Selector = "Button".parse().unwrap();
        assert!(id.specificity() > class.specificity());
        assert!(class.specificity() > ty.specificity());
        // One ID beats any number of classes.
        let many: Selector = ".a.b.c.d".parse().unwrap();
        assert!(id.specificity() > many.specificity());
    }
}
