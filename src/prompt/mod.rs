use crate::validate::clean_for_parsing;

fn design_guidance() -> &'static str {
r#"Design:
- Tailwind CSS only. Rich palette (blue-600, indigo-600, emerald-600, slate-50/100/200/700/800), gradients, shadows, hover states.
- Tables: "overflow-hidden rounded-xl border border-slate-200 bg-white shadow-xl", zebra rows, hover highlight.
- Buttons: gradient background, semibold text, rounded-lg, shadow, "transition-all duration-200".
- Icons: Unicode/emoji only (▲ ▼ ← → ✓ ✕ ⚙️ 🔍 ⭐ ⚠️ ✅ ❌ ℹ️ 👤 ☰).
- Images: placehold.co URLs, "rounded-lg object-cover shadow-md"."#
}

fn code_rules() -> &'static str {
r#"Code rules:
- Dependencies: react, lodash (_) and Tailwind CSS. Nothing else.
- TypeScript functional component, default export.
- Every .map() MUST give each element a unique key prop.
- Return the component in ONE fenced ```tsx block, starting with `import React from 'react';`."#
}

/// Initial generation prompt built around the user's requirements.
pub fn component_prompt(requirements: &str) -> String {
    format!(
"Create a React component: {requirements}

{design}

{rules}",
        requirements = requirements.trim(),
        design = design_guidance(),
        rules = code_rules(),
    )
}

/// Sent after a cut-off answer; the partial answer precedes it in history.
pub fn continuation_instruction() -> &'static str {
r#"Your previous answer was cut off. Continue EXACTLY where it stopped.
- Do not repeat anything you already wrote.
- Do not add commentary, explanations or a new code fence.
- Close every open string, bracket, JSX element and the code fence when you finish."#
}

/// Single corrective prompt that replaces the whole conversation. Any fence
/// already around `problematic` is stripped before it is re-fenced.
pub fn rewrite_prompt(original_request: &str, problematic: &str, diagnostic: &str) -> String {
    format!(
"The component below was generated for this request but does not parse.

Original request:
{original}

Parser diagnostic:
{diagnostic}

Problematic code:
```tsx
{problematic}
```

Rewrite the COMPLETE component from scratch so that it parses and fully satisfies the request.

{rules}",
        original = original_request.trim(),
        diagnostic = diagnostic.trim(),
        problematic = clean_for_parsing(problematic).body,
        rules = code_rules(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_prompt_embeds_requirements() {
        let p = component_prompt("  a sortable user table ");
        assert!(p.starts_with("Create a React component: a sortable user table\n"));
        assert!(p.contains("unique key prop"));
    }

    #[test]
    fn rewrite_prompt_carries_code_and_diagnostic() {
        let p = rewrite_prompt("a button", "const A = () => <b>;;", "Unexpected token (1:20)");
        assert!(p.contains("a button"));
        assert!(p.contains("const A = () => <b>;;"));
        assert!(p.contains("Unexpected token (1:20)"));
    }

    #[test]
    fn rewrite_prompt_does_not_double_fence() {
        let p = rewrite_prompt("a button", "Here:\n```tsx\nconst A = () => <b>;;\n```\nDone", "Unexpected token");
        assert_eq!(p.matches("```tsx").count(), 2, "one for the code, one in the rules");
        assert!(p.contains("```tsx\nconst A = () => <b>;;\n```"));
        assert!(!p.contains("Here:"));
    }
}
