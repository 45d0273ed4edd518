//! 号码目录
//!
//! 数字类型生成 "1".."N"（可按 N 的位数补零），自定义类型使用去重后的标签列表。

use std::collections::HashSet;

use crate::error::{AppError, AppResult};

/// 数字号码上限
pub const MAX_NUMERIC_ELEMENTS: u32 = 100_000;
/// 自定义标签数量上限
pub const MAX_CUSTOM_ELEMENTS: usize = 10_000;
/// 单个自定义标签最大长度
pub const MAX_LABEL_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementCatalog {
    elements: Vec<String>,
    index: HashSet<String>,
}

impl ElementCatalog {
    pub fn numeric(count: u32, zero_padded: bool) -> AppResult<Self> {
        if count == 0 {
            return Err(AppError::invalid_field(
                "element_count",
                "A raffle must have at least one element",
            ));
        }
        if count > MAX_NUMERIC_ELEMENTS {
            return Err(AppError::invalid_field(
                "element_count",
                format!("A raffle can have at most {MAX_NUMERIC_ELEMENTS} elements"),
            ));
        }

        let width = if zero_padded {
            count.to_string().len()
        } else {
            0
        };
        let elements = (1..=count)
            .map(|n| format!("{n:0width$}"))
            .collect::<Vec<_>>();
        Ok(Self::from_unique(elements))
    }

    /// 自定义标签：去除首尾空白，保留首次出现顺序去重
    pub fn custom(labels: Vec<String>) -> AppResult<Self> {
        if labels.len() > MAX_CUSTOM_ELEMENTS {
            return Err(AppError::invalid_field(
                "custom_elements",
                format!("At most {MAX_CUSTOM_ELEMENTS} custom elements are allowed"),
            ));
        }

        let mut seen = HashSet::with_capacity(labels.len());
        let mut elements = Vec::with_capacity(labels.len());
        for label in labels {
            let label = label.trim().to_string();
            if label.is_empty() {
                return Err(AppError::invalid_field(
                    "custom_elements",
                    "Custom elements must not be empty",
                ));
            }
            if label.chars().count() > MAX_LABEL_LEN {
                return Err(AppError::invalid_field(
                    "custom_elements",
                    format!("Custom elements must be at most {MAX_LABEL_LEN} characters"),
                ));
            }
            if seen.insert(label.clone()) {
                elements.push(label);
            }
        }

        if elements.is_empty() {
            return Err(AppError::invalid_field(
                "custom_elements",
                "A raffle must have at least one element",
            ));
        }
        Ok(Self {
            elements,
            index: seen,
        })
    }

    fn from_unique(elements: Vec<String>) -> Self {
        let index = elements.iter().cloned().collect();
        Self { elements, index }
    }

    pub fn contains(&self, element: &str) -> bool {
        self.index.contains(element)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.elements
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.elements.iter()
    }
}
