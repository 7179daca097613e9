use corpus::{EntitySchema, ExampleRecord, Granularity};
use serde::{Deserialize, Serialize};

use crate::style::{CodeStyle, END, END_LINE, NlStyle, PromptStyle, TemplateDescriptor};

const CODE_SCHEMA_HEADER: &str = "# Entity type definitions:";
const NL_SCHEMA_HEADER: &str = "Entity types:";

/// One prompt shape for a (granularity, style, variation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub granularity: Granularity,
    pub variation_id: String,
    pub descriptor: TemplateDescriptor,
    pub include_schema: bool,
    /// Accepted text of a generated variation. Replaces schema and examples when set.
    #[serde(default)]
    pub fixed_prefix: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedPrompt {
    pub prompt: String,
    pub stop_sequences: Vec<String>,
}

impl PromptTemplate {
    pub fn new(granularity: Granularity, variation_id: &str, descriptor: TemplateDescriptor) -> Self {
        Self {
            granularity,
            variation_id: variation_id.to_string(),
            descriptor,
            include_schema: true,
            fixed_prefix: None,
        }
    }

    pub fn with_schema(mut self, include_schema: bool) -> Self {
        self.include_schema = include_schema;
        self
    }

    pub fn with_fixed_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.fixed_prefix = Some(prefix.into());
        self
    }

    pub fn style(&self) -> PromptStyle {
        self.descriptor.style()
    }

    /// Full prompt for one input text.
    pub fn render(
        &self,
        schema: &EntitySchema,
        examples: &[ExampleRecord],
        input_text: &str,
    ) -> RenderedPrompt {
        let prefix = match &self.fixed_prefix {
            Some(fixed) => fixed.trim_end().to_string(),
            None => self.render_prefix(schema, examples),
        };
        let query = self.render_query(input_text);

        let prompt = if prefix.is_empty() {
            query
        } else {
            format!("{prefix}\n\n{query}")
        };

        RenderedPrompt {
            prompt,
            stop_sequences: self.style().stop_sequences(),
        }
    }

    /// Schema block and example blocks, without the query slot.
    ///
    /// This is also the base text handed to the paraphraser.
    pub fn render_prefix(&self, schema: &EntitySchema, examples: &[ExampleRecord]) -> String {
        let mut parts = Vec::new();

        if self.include_schema && !schema.is_empty() {
            parts.push(match self.descriptor {
                TemplateDescriptor::Code(_) => code_schema_block(schema),
                TemplateDescriptor::NaturalLanguage(_) => nl_schema_block(schema),
            });
        }

        for example in examples {
            parts.push(match &self.descriptor {
                TemplateDescriptor::Code(style) => code_example(style, example),
                TemplateDescriptor::NaturalLanguage(style) => nl_example(style, example),
            });
        }

        parts.join("\n\n")
    }

    /// The open slot the model completes.
    pub fn render_query(&self, input_text: &str) -> String {
        match &self.descriptor {
            TemplateDescriptor::Code(style) => format!("{}\n", code_header(style, input_text)),
            TemplateDescriptor::NaturalLanguage(style) => nl_header(style, input_text),
        }
    }
}

/// Escape a value for a double-quoted string literal.
pub fn escape_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

pub fn unescape_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
                continue;
            }
        }
        out.push(c);
    }
    out
}

fn code_schema_block(schema: &EntitySchema) -> String {
    let mut block = String::from(CODE_SCHEMA_HEADER);
    for t in &schema.types {
        block.push_str(&format!("\n# \"{}\": {}", escape_literal(&t.id), t.description));
    }
    block
}

fn nl_schema_block(schema: &EntitySchema) -> String {
    format!("{NL_SCHEMA_HEADER} {}", schema.type_ids().collect::<Vec<_>>().join(", "))
}

fn code_header(style: &CodeStyle, input_text: &str) -> String {
    format!(
        "def {name}({input}):\n\t\"\"\" {doc} . \"\"\"\n\t{input} = \"{text}\"\n\t{list} = []\n\t# {comment}",
        name = style.function_name,
        input = style.input_var,
        doc = style.docstring,
        text = escape_literal(input_text),
        list = style.list_var,
        comment = style.inline_comment,
    )
}

fn code_example(style: &CodeStyle, example: &ExampleRecord) -> String {
    let mut block = code_header(style, &example.text);
    for entity in &example.entities {
        block.push_str(&format!(
            "\n\t{list}.append({{\"{tk}\": \"{text}\", \"{yk}\": \"{ty}\"}})",
            list = style.list_var,
            tk = style.text_key,
            text = escape_literal(&entity.text),
            yk = style.type_key,
            ty = escape_literal(&entity.entity_type),
        ));
    }
    block.push('\n');
    block.push_str(END);
    block
}

fn nl_header(style: &NlStyle, input_text: &str) -> String {
    format!(
        "{} \"{}\" {} {}",
        style.input_prefix, input_text, style.input_suffix, style.entity_prompt
    )
}

fn nl_example(style: &NlStyle, example: &ExampleRecord) -> String {
    let annotation = if example.entities.is_empty() {
        "<5> <1>".to_string()
    } else {
        example
            .entities
            .iter()
            .map(|e| format!("<0> {} <5> {} <1>", e.entity_type, e.text))
            .collect::<Vec<_>>()
            .join(" ; ")
    };
    format!("{} {}{}", nl_header(style, &example.text), annotation, END_LINE)
}

/// Recover the type ids listed in a rendered schema block.
pub fn parse_schema_block(prompt: &str, style: PromptStyle) -> Vec<String> {
    match style {
        PromptStyle::Code => {
            let mut lines = prompt.lines().skip_while(|l| l.trim() != CODE_SCHEMA_HEADER);
            if lines.next().is_none() {
                return Vec::new();
            }
            lines
                .map_while(|line| {
                    let rest = line.strip_prefix("# \"")?;
                    let (id, _) = split_closing_quote(rest)?;
                    Some(unescape_literal(id))
                })
                .collect()
        }
        PromptStyle::NaturalLanguage => prompt
            .lines()
            .find_map(|l| l.strip_prefix(NL_SCHEMA_HEADER))
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default(),
    }
}

/// Split `id": rest` at the first unescaped quote.
fn split_closing_quote(s: &str) -> Option<(&str, &str)> {
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        match c {
            '\\' if !escaped => escaped = true,
            '"' if !escaped => return Some((&s[..i], &s[i + 1..])),
            _ => escaped = false,
        }
    }
    None
}
