// SPDX-License-Identifier: MIT OR Apache-2.0
//! Products, product versions, and execution environments.

use crate::Id;
use serde::{Deserialize, Serialize};

/// A product under test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Primary key.
    pub id: Id,
    /// Product name, unique per deployment.
    pub name: String,
}

/// A released or in-development version of a [`Product`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductVersion {
    /// Primary key.
    pub id: Id,
    /// Owning product.
    pub product: Id,
    /// Version string (e.g. `"1.0"`, `"2.1b3"`).
    pub version: String,
}

/// A named execution context (OS/browser/etc. combination) attachable to a
/// run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    /// Primary key.
    pub id: Id,
    /// The element names composing this environment, in display order.
    pub elements: Vec<String>,
}

impl Environment {
    /// Human-readable name, e.g. `"Linux, Firefox 14"`.
    pub fn name(&self) -> String {
        self.elements.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_name_joins_elements() {
        let env = Environment {
            id: 2,
            elements: vec!["OS X 10.7".into(), "Firefox 14".into()],
        };
        assert_eq!(env.name(), "OS X 10.7, Firefox 14");
    }

    #[test]
    fn environment_name_of_single_element() {
        let env = Environment {
            id: 1,
            elements: vec!["Linux".into()],
        };
        assert_eq!(env.name(), "Linux");
    }
}
