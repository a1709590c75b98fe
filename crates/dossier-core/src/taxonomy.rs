//! The fixed two-level personnel archive taxonomy.
//!
//! Ten root categories numbered `1..=10`. Roots 4 and 9 each own four
//! sub-categories numbered `1..=4`; every other root is a leaf.
//!
//! A node's identity is `(main_code, sub_code)`. Its code string is
//! `"<main>"` for a root and `"<main>-<sub>"` for a sub-category. Display
//! labels (`"四、学历学位…"`, `"1、学历学位材料"`) are produced by
//! [`Taxonomy::display_label`] and never feed back into identity;
//! [`strip_display_prefix`] recovers the plain label from a rendered one.
//!
//! # Example
//!
//! ```rust
//! use dossier_core::taxonomy::Taxonomy;
//!
//! let taxonomy = Taxonomy::builtin();
//! assert_eq!(taxonomy.resolve("学历学位材料", Some(taxonomy.roots()[3].label.as_str())).unwrap(), "4-1");
//! assert_eq!(taxonomy.children("履历材料").unwrap().len(), 0);
//! ```

use serde::Serialize;

use crate::error::TaxonomyError;

/// One entry of the category tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryNode {
    /// Position in the catalog, 1-based, stable across runs.
    pub id: u32,
    pub label: String,
    /// Label of the owning root, `None` for roots.
    pub parent_label: Option<String>,
    pub main_code: u8,
    pub sub_code: Option<u8>,
}

impl CategoryNode {
    /// `"<main>"` or `"<main>-<sub>"`.
    pub fn code(&self) -> String {
        match self.sub_code {
            Some(sub) => format!("{}-{}", self.main_code, sub),
            None => self.main_code.to_string(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_label.is_none()
    }
}

const ROOTS: [&str; 10] = [
    "履历材料",
    "自传和思想材料",
    "考核鉴定材料",
    "学历学位、专业技术职务（职称）、学习培训材料",
    "政审、审计和审核材料",
    "党、团材料",
    "表彰奖励材料",
    "违规违纪违法处理处分材料",
    "工资、任免、出国和会议代表等材料",
    "其他可供组织参考的材料",
];

const SUBS_4: [&str; 4] = [
    "学历学位材料",
    "职业（执业）资格和专业技术职务（职称）材料",
    "科研学术水平材料",
    "培训材料",
];

const SUBS_9: [&str; 4] = [
    "工资待遇审批材料",
    "任免材料",
    "出国（境）审批材料",
    "会议代表登记材料",
];

const CJK_NUMERALS: [&str; 10] = ["一", "二", "三", "四", "五", "六", "七", "八", "九", "十"];

/// Full-width separator between a display prefix and the label.
pub const DISPLAY_SEPARATOR: char = '、';

/// CJK numeral for `1..=10`, used by display labels and sheet names.
pub fn cjk_numeral(n: u8) -> Option<&'static str> {
    if (1..=10).contains(&n) {
        Some(CJK_NUMERALS[(n - 1) as usize])
    } else {
        None
    }
}

/// Immutable category catalog.
#[derive(Debug, Clone)]
pub struct Taxonomy {
    nodes: Vec<CategoryNode>,
}

impl Taxonomy {
    /// The compiled-in catalog. Roots come first in code order, followed by
    /// their sub-categories.
    pub fn builtin() -> Self {
        let mut nodes = Vec::with_capacity(18);
        let mut next_id = 1u32;
        for (i, label) in ROOTS.iter().enumerate() {
            nodes.push(CategoryNode {
                id: next_id,
                label: (*label).to_string(),
                parent_label: None,
                main_code: (i + 1) as u8,
                sub_code: None,
            });
            next_id += 1;
        }
        for (main, subs) in [(4u8, &SUBS_4), (9u8, &SUBS_9)] {
            let parent = ROOTS[(main - 1) as usize];
            for (j, label) in subs.iter().enumerate() {
                nodes.push(CategoryNode {
                    id: next_id,
                    label: (*label).to_string(),
                    parent_label: Some(parent.to_string()),
                    main_code: main,
                    sub_code: Some((j + 1) as u8),
                });
                next_id += 1;
            }
        }
        Self { nodes }
    }

    pub fn nodes(&self) -> &[CategoryNode] {
        &self.nodes
    }

    /// Root categories ordered by `main_code`.
    pub fn roots(&self) -> Vec<&CategoryNode> {
        let mut roots: Vec<&CategoryNode> = self.nodes.iter().filter(|n| n.is_root()).collect();
        roots.sort_by_key(|n| n.main_code);
        roots
    }

    /// Look up a node by label, scoped to a parent when given.
    pub fn find(&self, label: &str, parent_label: Option<&str>) -> Option<&CategoryNode> {
        let label = label.trim();
        self.nodes.iter().find(|n| {
            n.label == label
                && match parent_label {
                    Some(p) => n.parent_label.as_deref() == Some(p.trim()),
                    None => true,
                }
        })
    }

    /// Resolve a label (optionally scoped to its parent) to its code string.
    pub fn resolve(&self, label: &str, parent_label: Option<&str>) -> Result<String, TaxonomyError> {
        self.find(label, parent_label)
            .map(CategoryNode::code)
            .ok_or_else(|| TaxonomyError::CategoryNotFound(label.to_string()))
    }

    /// Sub-categories of the node with this label, ordered by `sub_code`.
    /// Leaves return an empty list; unknown labels are an error.
    pub fn children(&self, label: &str) -> Result<Vec<CategoryNode>, TaxonomyError> {
        let node = self
            .find(label, None)
            .ok_or_else(|| TaxonomyError::CategoryNotFound(label.to_string()))?;
        let mut children: Vec<CategoryNode> = self
            .nodes
            .iter()
            .filter(|n| n.parent_label.as_deref() == Some(node.label.as_str()))
            .cloned()
            .collect();
        children.sort_by_key(|n| n.sub_code);
        Ok(children)
    }

    pub fn has_children(&self, node: &CategoryNode) -> bool {
        node.is_root()
            && self
                .nodes
                .iter()
                .any(|n| n.parent_label.as_deref() == Some(node.label.as_str()))
    }

    /// Find a node by its code string (`"7"`, `"9-2"`).
    pub fn by_code(&self, code: &str) -> Option<&CategoryNode> {
        let code = code.trim();
        self.nodes.iter().find(|n| n.code() == code)
    }

    /// Accepts a code, a plain label, or a rendered display label.
    pub fn lookup(&self, input: &str) -> Result<&CategoryNode, TaxonomyError> {
        let input = input.trim();
        self.by_code(input)
            .or_else(|| self.find(input, None))
            .or_else(|| self.find(strip_display_prefix(input), None))
            .ok_or_else(|| TaxonomyError::CategoryNotFound(input.to_string()))
    }

    /// `"一、履历材料"` for roots, `"1、学历学位材料"` for sub-categories.
    pub fn display_label(&self, node: &CategoryNode) -> String {
        match node.sub_code {
            Some(sub) => format!("{}{}{}", sub, DISPLAY_SEPARATOR, node.label),
            None => match cjk_numeral(node.main_code) {
                Some(numeral) => format!("{}{}{}", numeral, DISPLAY_SEPARATOR, node.label),
                None => node.label.clone(),
            },
        }
    }
}

impl Default for Taxonomy {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Remove a leading `"<numeral>、"` display prefix, CJK or Arabic.
pub fn strip_display_prefix(label: &str) -> &str {
    let label = label.trim();
    match label.split_once(DISPLAY_SEPARATOR) {
        Some((prefix, rest))
            if !prefix.is_empty()
                && prefix
                    .chars()
                    .all(|c| c.is_ascii_digit() || CJK_NUMERALS.iter().any(|n| n.starts_with(c))) =>
        {
            rest.trim()
        }
        _ => label,
    }
}
