//! Prompts for vision-model trademark extraction.
//!
//! Callers can override the system prompt via
//! [`crate::config::ScanConfig::system_prompt`]; the constant here is used
//! only when no override is given. The JSON keys it asks for are the ones
//! [`crate::pipeline::postprocess::parse_record`] reads.

/// Default system prompt for extracting one trademark record from a page image.
pub const DEFAULT_EXTRACTION_PROMPT: &str = r#"You are reading one page of a trademark registry bulletin. Extract the trademark record shown on the page.

Return ONLY a JSON object with these keys:

- "brandName": the word mark / brand name as printed. Use "" if the page carries no trademark.
- "applicationNumber": the application or registration number.
- "filingDate": filing date (INID 151) as YYYY-MM-DD.
- "expiryDate": expiry date (INID 180) as YYYY-MM-DD.
- "owner": owner name and address (INID 732).
- "niceClassification": list of Nice class numbers (INID 511) as strings, e.g. ["25", "35"].
- "colors": colours claimed (INID 591).
- "description": a brief visual description of the mark or logo.
- "logo_bounding_box": bounding box of the logo image as [ymin, xmin, ymax, xmax] on a 0-1000 scale, where ymin is the top edge and xmin the left edge. Return [] if the mark is text only.

Rules:
- Copy numbers, dates and names exactly; do not guess missing values, use "" instead.
- Do NOT wrap the JSON in code fences.
- Do NOT add commentary before or after the JSON."#;

/// User-turn text sent alongside the page image.
pub const PAGE_INSTRUCTION: &str = "Extract the trademark record from this page.";
