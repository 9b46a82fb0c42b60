use serde_json::Value;

use crate::schema::SchemaFile;

/// Render every schema as one self-contained HTML page.
pub fn render_schema_docs(schemas: &[SchemaFile], generated_at: &str) -> String {
    let mut sorted: Vec<&SchemaFile> = schemas.iter().collect();
    sorted.sort_by(|a, b| {
        provider_label(a)
            .cmp(&provider_label(b))
            .then_with(|| a.resource_type().cmp(&b.resource_type()))
    });

    let nav: String = sorted
        .iter()
        .map(|s| {
            format!(
                "<li><a href=\"#{anchor}\">{rt}</a> <span class=\"provider\">{provider}</span></li>\n",
                anchor = anchor(s),
                rt = html_escape(s.resource_type().unwrap_or("unknown")),
                provider = html_escape(&provider_label(s)),
            )
        })
        .collect();

    let sections: String = sorted.iter().map(|s| schema_section(s)).collect();

    let content = if schemas.is_empty() {
        "<div class=\"empty\">No schema files found.</div>".to_string()
    } else {
        format!("<nav><ul>\n{nav}</ul></nav>\n{sections}")
    };

    format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Resource Schemas</title>
<style>
  :root {{
    --bg: #0d1117; --fg: #c9d1d9; --border: #30363d;
    --card: #161b22; --accent: #58a6ff; --muted: #8b949e;
  }}
  * {{ margin: 0; padding: 0; box-sizing: border-box; }}
  body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Helvetica, Arial, sans-serif;
    background: var(--bg); color: var(--fg); line-height: 1.5; padding: 2rem; }}
  .container {{ max-width: 1100px; margin: 0 auto; }}
  header {{ padding: 1.5rem; background: var(--card); border: 1px solid var(--border);
    border-radius: 8px; margin-bottom: 1.5rem; }}
  header h1 {{ font-size: 1.4rem; }}
  header p {{ color: var(--muted); font-size: 0.85rem; }}
  nav ul {{ list-style: none; columns: 2; margin-bottom: 1.5rem; }}
  nav a, footer a {{ color: var(--accent); text-decoration: none; }}
  .provider {{ color: var(--muted); font-size: 0.75rem; }}
  section {{ background: var(--card); border: 1px solid var(--border);
    border-radius: 8px; padding: 1rem 1.5rem; margin-bottom: 1.5rem; }}
  section h2 {{ font-size: 1.1rem; margin-bottom: 0.5rem; }}
  table {{ width: 100%; border-collapse: collapse; margin-top: 0.5rem; }}
  th {{ text-align: left; padding: 0.5rem; border-bottom: 2px solid var(--border);
    font-size: 0.8rem; text-transform: uppercase; color: var(--muted); }}
  td {{ padding: 0.4rem 0.5rem; border-bottom: 1px solid var(--border); font-size: 0.9rem; }}
  details pre {{ background: var(--bg); padding: 0.5rem; border-radius: 4px;
    margin-top: 0.3rem; overflow-x: auto; font-size: 0.8rem; }}
  footer {{ margin-top: 1.5rem; text-align: center; font-size: 0.8rem; color: var(--muted); }}
  .empty {{ text-align: center; padding: 3rem; color: var(--muted); font-size: 1.2rem; }}
</style>
</head>
<body>
<div class="container">
  <header>
    <h1>Resource Schemas</h1>
    <p>{count} schema(s), generated {generated_at}</p>
  </header>

  {content}

  <footer>Generated by iom-schemas {version}</footer>
</div>
</body>
</html>
"##,
        count = schemas.len(),
        generated_at = html_escape(generated_at),
        content = content,
        version = env!("CARGO_PKG_VERSION"),
    )
}

fn schema_section(schema: &SchemaFile) -> String {
    let rows: String = schema
        .configuration()
        .map(|config| {
            config
                .iter()
                .map(|(field, kind)| {
                    let kind = match kind {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    format!(
                        "<tr><td><code>{}</code></td><td>{}</td></tr>\n",
                        html_escape(field),
                        html_escape(&kind)
                    )
                })
                .collect()
        })
        .unwrap_or_default();

    let raw = schema
        .first_entry()
        .and_then(|e| serde_json::to_string_pretty(e).ok())
        .unwrap_or_default();

    format!(
        r#"<section id="{anchor}">
  <h2>{rt}</h2>
  <p class="provider">{provider} &middot; {fields} configuration field(s) &middot; {file}</p>
  <table>
    <thead><tr><th>Field</th><th>Type</th></tr></thead>
    <tbody>
{rows}    </tbody>
  </table>
  <details><summary>Raw schema</summary><pre><code>{raw}</code></pre></details>
</section>
"#,
        anchor = anchor(schema),
        rt = html_escape(schema.resource_type().unwrap_or("unknown")),
        provider = html_escape(&provider_label(schema)),
        fields = schema.config_field_count(),
        file = html_escape(&schema.file_name),
        rows = rows,
        raw = html_escape(&raw),
    )
}

fn provider_label(schema: &SchemaFile) -> String {
    schema
        .provider()
        .map(|p| p.platform_name())
        .unwrap_or_else(|| "Unknown".into())
}

fn anchor(schema: &SchemaFile) -> String {
    schema
        .file_name
        .trim_end_matches(".json")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect()
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
