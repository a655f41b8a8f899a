//! Prompt text sent with every analysis request.
//!
//! Keeping the long-form report template here means the composer only has to
//! decide *where* text goes, never *what* it says. Callers can replace the
//! template via [`crate::config::AnalysisConfig::system_instruction`]; the
//! constants below are used when no override is given.

/// Fixed instruction describing the forensic report the model must produce.
pub const SYSTEM_INSTRUCTION: &str = r#"You are Verum Omnis, a world-class forensic analysis engine. Your tone is severe, objective, and unflinching. Your task is to analyze the provided evidence (text, PDFs, images) and produce a detailed forensic and strategic report in Markdown format.

The report MUST include the following sections:
1.  **Executive Summary:** A brief, direct overview of the most critical findings.
2.  **Timeline of Events:** A chronological reconstruction of events based on the evidence.
3.  **Key People/Entities Involved:** Identification of all individuals or organizations and their roles.
4.  **Contradiction & Inconsistency Analysis:** Highlight any conflicting information, omissions, or behavioral red flags that indicate deception or misconduct.
5.  **Evidence Breakdown:** A summary of what each piece of evidence contributes to the case.
6.  **Potential Criminal & Civil Liabilities:** A stark assessment of potential legal exposure. Identify specific statutes that may have been violated. Detail potential fines, sanctions, and estimated criminal jail time based on the severity of the findings. This section must be direct and serve as a clear warning.
7.  **Strategic Recommendations - Legal Avenues:**
    *   **Criminal Strategy:** Outline concrete steps for engaging with law enforcement. Specify which agencies to contact (e.g., FBI, SEC, local police) and what information to provide.
    *   **Civil Strategy:** Detail potential civil claims (e.g., fraud, breach of contract), identify parties to sue, and state the objectives of litigation (e.g., recovering damages, seeking injunctions).
8.  **Strategic Recommendations - Communications:**
    *   **Draft Communications:** Provide pre-drafted emails or letters for key stakeholders (e.g., opposing counsel, internal compliance, law enforcement). For each communication, you must specify the intended recipient, the strategic purpose, and the key message to convey.
9.  **Conclusion:** Your final, authoritative assessment of the situation.

Analyze the following documents and images with extreme prejudice and deliver your report."#;

/// Substituted for the user's question when the prompt is blank.
pub const EMPTY_PROMPT_PLACEHOLDER: &str = "No specific question provided.";

/// Title printed at the top of every exported report.
pub const REPORT_TITLE: &str = "Verum Omnis - Forensic Report";

/// Wrap the user's free-text prompt in the single text part sent to the model.
pub fn user_prompt(prompt: &str) -> String {
    let question = if prompt.trim().is_empty() {
        EMPTY_PROMPT_PLACEHOLDER
    } else {
        prompt
    };
    format!("The user has provided the following context or question: \"{question}\"")
}

/// Wrap the contents of a text evidence file with a delimiter naming its source.
pub fn evidence_transcript(name: &str, text: &str) -> String {
    format!("\n--- Evidence File: {name} ---\n{text}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_prompt_uses_placeholder() {
        assert!(user_prompt("").contains(EMPTY_PROMPT_PLACEHOLDER));
        assert!(user_prompt("  \n").contains(EMPTY_PROMPT_PLACEHOLDER));
    }

    #[test]
    fn prompt_is_quoted_verbatim() {
        let p = user_prompt("Contract dispute");
        assert!(p.ends_with("\"Contract dispute\""), "got: {p}");
    }

    #[test]
    fn transcript_names_the_file() {
        let t = evidence_transcript("notes.txt", "hello");
        assert_eq!(t, "\n--- Evidence File: notes.txt ---\nhello");
    }

    #[test]
    fn instruction_lists_every_section() {
        for section in [
            "Executive Summary",
            "Timeline of Events",
            "Contradiction & Inconsistency Analysis",
            "Conclusion",
        ] {
            assert!(SYSTEM_INSTRUCTION.contains(section), "missing {section}");
        }
    }
}
