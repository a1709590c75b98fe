//! `dossier categories`: print the taxonomy tree or one node's children.

use anyhow::Result;
use dossier_core::{CategoryNode, Taxonomy};
use serde::Serialize;

/// A node as shown to operators: identity plus its rendered label.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryView {
    pub code: String,
    pub label: String,
    pub display_label: String,
    pub parent_label: Option<String>,
    pub children: Vec<CategoryView>,
}

impl CategoryView {
    fn of(taxonomy: &Taxonomy, node: &CategoryNode, children: Vec<CategoryView>) -> Self {
        Self {
            code: node.code(),
            label: node.label.clone(),
            display_label: taxonomy.display_label(node),
            parent_label: node.parent_label.clone(),
            children,
        }
    }
}

/// Every root with its sub-categories.
pub fn category_tree(taxonomy: &Taxonomy) -> Vec<CategoryView> {
    taxonomy
        .roots()
        .into_iter()
        .map(|root| {
            let children = taxonomy
                .children(&root.label)
                .unwrap_or_default()
                .iter()
                .map(|c| CategoryView::of(taxonomy, c, Vec::new()))
                .collect();
            CategoryView::of(taxonomy, root, children)
        })
        .collect()
}

/// Children of the node named by `input` (code, label, or display label).
pub fn category_children(taxonomy: &Taxonomy, input: &str) -> Result<Vec<CategoryView>> {
    let node = taxonomy.lookup(input)?;
    Ok(taxonomy
        .children(&node.label)?
        .iter()
        .map(|c| CategoryView::of(taxonomy, c, Vec::new()))
        .collect())
}

pub fn run_categories(label: Option<String>, json: bool) -> Result<()> {
    let taxonomy = Taxonomy::builtin();
    let views = match &label {
        Some(input) => category_children(&taxonomy, input)?,
        None => category_tree(&taxonomy),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&views)?);
        return Ok(());
    }

    if views.is_empty() {
        println!("No sub-categories.");
        return Ok(());
    }
    for view in &views {
        println!("{:<5} {}", view.code, view.display_label);
        for child in &view.children {
            println!("  {:<5} {}", child.code, child.display_label);
        }
    }
    Ok(())
}
