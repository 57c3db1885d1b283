use std::fmt;

use crate::color::ColorSetting;
use crate::error::GammaError;

/// Which partitions or CRTCs a selection names.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum IndexSelector {
    #[default]
    All,
    Indices(Vec<usize>),
}

impl IndexSelector {
    pub fn one(index: usize) -> Self {
        IndexSelector::Indices(vec![index])
    }

    /// Parses `all` or a comma-separated list of non-negative integers.
    pub fn parse(value: &str, name: &'static str) -> Result<Self, GammaError> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("all") {
            return Ok(IndexSelector::All);
        }
        value
            .split(',')
            .map(|part| part.trim().parse::<usize>())
            .collect::<Result<Vec<_>, _>>()
            .map(IndexSelector::Indices)
            .map_err(|_| GammaError::MalformedSelector {
                name,
                value: value.to_string(),
            })
    }

    /// Expands against `available` entries. On failure returns the first
    /// index that is out of range.
    pub fn resolve(&self, available: usize) -> Result<Vec<usize>, usize> {
        match self {
            IndexSelector::All => Ok((0..available).collect()),
            IndexSelector::Indices(indices) => {
                if let Some(&bad) = indices.iter().find(|&&i| i >= available) {
                    return Err(bad);
                }
                let mut seen = Vec::with_capacity(indices.len());
                for &index in indices {
                    if !seen.contains(&index) {
                        seen.push(index);
                    }
                }
                Ok(seen)
            }
        }
    }
}

impl fmt::Display for IndexSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexSelector::All => f.write_str("all"),
            IndexSelector::Indices(indices) => {
                let list: Vec<String> = indices.iter().map(|i| i.to_string()).collect();
                f.write_str(&list.join(","))
            }
        }
    }
}

/// A rule choosing CRTCs on one site, and the adjustment they start with.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Selection {
    /// `None` targets the backend's default site.
    pub site: Option<String>,
    pub partitions: IndexSelector,
    pub crtcs: IndexSelector,
    pub settings: ColorSetting,
}

/// The default selection plus any explicit ones made from it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectionList {
    default: Selection,
    explicit: Vec<Selection>,
}

impl SelectionList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_selection(&self) -> &Selection {
        &self.default
    }

    pub fn default_selection_mut(&mut self) -> &mut Selection {
        &mut self.default
    }

    /// Adds an explicit selection copied from the default one.
    pub fn push(&mut self) -> &mut Selection {
        self.explicit.push(self.default.clone());
        let last = self.explicit.len() - 1;
        &mut self.explicit[last]
    }

    pub fn push_selection(&mut self, selection: Selection) {
        self.explicit.push(selection);
    }

    pub fn explicit(&self) -> &[Selection] {
        &self.explicit
    }

    pub fn is_default_only(&self) -> bool {
        self.explicit.is_empty()
    }

    /// Selections resolution walks: the explicit ones, or the default
    /// one when nothing else was given.
    pub fn effective(&self) -> &[Selection] {
        if self.explicit.is_empty() {
            std::slice::from_ref(&self.default)
        } else {
            &self.explicit
        }
    }
}
