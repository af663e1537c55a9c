//! Curated seed patterns shipped with the validator
//!
//! Conservative rules designed to catch obvious attacks with minimal false
//! positives. Learned patterns accumulate next to these at runtime.

use aegis_types::ThreatCategory;

use super::{Pattern, StructuralPredicate};

/// The full seed corpus, loaded once at store construction
pub fn seed_patterns() -> Vec<Pattern> {
    let mut patterns = Vec::new();
    patterns.extend(prompt_injection_patterns());
    patterns.extend(exfiltration_patterns());
    patterns.extend(command_execution_patterns());
    patterns.extend(impersonation_patterns());
    patterns.extend(pii_patterns());
    patterns.extend(encoded_payload_patterns());
    patterns
}

fn prompt_injection_patterns() -> Vec<Pattern> {
    vec![
        Pattern::seed(
            "seed-pi-001",
            "Ignore Previous Instructions",
            r"(?i)ignore\s+(all\s+)?(previous|prior|above|earlier)\s+(instructions|prompts|directives|rules)",
            ThreatCategory::PromptInjection,
            0.95,
        ),
        Pattern::seed(
            "seed-pi-002",
            "Disregard Prior",
            r"(?i)disregard\s+(all\s+)?(prior|previous|earlier|above)\b",
            ThreatCategory::PromptInjection,
            0.90,
        ),
        Pattern::seed(
            "seed-pi-003",
            "Forget Instructions",
            r"(?i)forget\s+(all\s+|everything\s+)?(about\s+)?(your|the|all)\s+(instructions|rules|guidelines|training)",
            ThreatCategory::PromptInjection,
            0.90,
        ),
        Pattern::seed(
            "seed-pi-004",
            "New System Prompt",
            r"(?i)(new|updated|revised)\s+system\s+(prompt|instructions|message)",
            ThreatCategory::PromptInjection,
            0.85,
        ),
        Pattern::seed(
            "seed-pi-005",
            "Override Safety",
            r"(?i)override\s+(safety|security|content|ethical)\s*(filters?|policies|restrictions|guidelines|rules)",
            ThreatCategory::PromptInjection,
            0.95,
        ),
        Pattern::seed(
            "seed-pi-006",
            "Pretend No Rules",
            r"(?i)(pretend|imagine|assume|act\s+as\s+if)\s+(you\s+)?(have\s+)?(no|zero|without)\s+(rules|restrictions|limits|guidelines|constraints)",
            ThreatCategory::PromptInjection,
            0.90,
        ),
        Pattern::seed(
            "seed-pi-007",
            "Special Token Injection",
            r"(?i)<\|?(system|im_start|endoftext)\|?>",
            ThreatCategory::PromptInjection,
            0.95,
        ),
        Pattern::seed(
            "seed-pi-008",
            "Instruction Delimiter Injection",
            r"(?i)(\[INST\]|\[/INST\]|<<SYS>>|<</SYS>>|###\s*(system|instruction))",
            ThreatCategory::PromptInjection,
            0.92,
        ),
    ]
}

fn exfiltration_patterns() -> Vec<Pattern> {
    vec![
        Pattern::seed(
            "seed-ex-001",
            "Reveal System Prompt",
            r"(?i)(reveal|show|print|display|output|repeat)\s+(me\s+)?(your|the)\s+(system\s+prompt|hidden\s+prompt|initial\s+instructions|original\s+instructions)",
            ThreatCategory::Exfiltration,
            0.92,
        ),
        Pattern::seed(
            "seed-ex-002",
            "Repeat Your Instructions",
            r"(?i)repeat\s+(your|the)\s+(instructions|rules|guidelines)\s+(verbatim|exactly|word\s+for\s+word)",
            ThreatCategory::Exfiltration,
            0.88,
        ),
        Pattern::seed(
            "seed-ex-003",
            "Send Data To URL",
            r"(?i)(send|post|upload|forward|transmit)\s+.{0,40}(secret|credential|password|token|key|conversation|context)s?\s+.{0,20}(https?://|to\s+the\s+url)",
            ThreatCategory::Exfiltration,
            0.90,
        ),
        Pattern::seed(
            "seed-ex-004",
            "Encode And Leak Instructions",
            r"(?i)(base64|rot13|hex)\s*-?\s*encode\s+.{0,30}(instructions|prompt|rules|context)",
            ThreatCategory::Exfiltration,
            0.88,
        ),
        Pattern::seed(
            "seed-ex-005",
            "Embedded Exfil Markdown Image",
            r"(?i)!\[[^\]]*\]\(https?://[^)]*\?(data|q|payload|content)=",
            ThreatCategory::Exfiltration,
            0.90,
        ),
    ]
}

fn command_execution_patterns() -> Vec<Pattern> {
    vec![
        Pattern::seed(
            "seed-ce-001",
            "Destructive Shell Command",
            r"(?i)\brm\s+-[rf]{1,2}\s+[/~.]",
            ThreatCategory::CommandExecution,
            0.95,
        ),
        Pattern::seed(
            "seed-ce-002",
            "Shell Substitution",
            r"\$\([^)]{1,80}\)|`[^`]{1,80}`",
            ThreatCategory::CommandExecution,
            0.60,
        ),
        Pattern::seed(
            "seed-ce-003",
            "Encoded PowerShell",
            r"(?i)powershell(\.exe)?\s+.{0,30}-enc(odedcommand)?\s+[A-Za-z0-9+/=]{16,}",
            ThreatCategory::CommandExecution,
            0.95,
        ),
        Pattern::seed(
            "seed-ce-004",
            "Pipe Download To Shell",
            r"(?i)(curl|wget)\s+[^\n|]{1,120}\|\s*(ba)?sh\b",
            ThreatCategory::CommandExecution,
            0.95,
        ),
        Pattern::seed(
            "seed-ce-005",
            "Path Traversal",
            r"\.\./\.\./|/etc/(passwd|shadow)\b",
            ThreatCategory::CommandExecution,
            0.85,
        ),
    ]
}

fn impersonation_patterns() -> Vec<Pattern> {
    vec![
        Pattern::seed(
            "seed-im-001",
            "Role Override",
            r"(?i)you\s+are\s+now\s+(a|an|my)\s+\w+",
            ThreatCategory::Impersonation,
            0.75,
        ),
        Pattern::seed(
            "seed-im-002",
            "Claimed Developer Authority",
            r"(?i)(i\s+am|this\s+is)\s+(your|the)\s+(developer|creator|administrator|operator)\b",
            ThreatCategory::Impersonation,
            0.80,
        ),
        Pattern::seed(
            "seed-im-003",
            "Fake Official Notice",
            r"(?i)official\s+(message|notice|directive)\s+from\s+(openai|anthropic|google|the\s+vendor)",
            ThreatCategory::Impersonation,
            0.85,
        ),
        Pattern::seed(
            "seed-im-004",
            "Developer Mode",
            r"(?i)(enable|enter|activate)\s+(developer|dan|god)\s+mode",
            ThreatCategory::Impersonation,
            0.90,
        ),
    ]
}

fn pii_patterns() -> Vec<Pattern> {
    vec![
        Pattern::seed(
            "seed-pii-001",
            "US Social Security Number",
            r"\b\d{3}-\d{2}-\d{4}\b",
            ThreatCategory::Pii,
            0.90,
        ),
        Pattern::seed(
            "seed-pii-002",
            "Payment Card Number",
            r"\b(?:\d[ -]?){15,16}\b",
            ThreatCategory::Pii,
            0.70,
        ),
        Pattern::seed(
            "seed-pii-003",
            "Credential Pair",
            r"(?i)(password|passwd|pwd)\s*[:=]\s*\S{6,}",
            ThreatCategory::Pii,
            0.85,
        ),
        Pattern::seed(
            "seed-pii-004",
            "Private Key Block",
            r"-----BEGIN\s+(RSA\s+|EC\s+|OPENSSH\s+)?PRIVATE\s+KEY-----",
            ThreatCategory::Pii,
            0.95,
        ),
    ]
}

fn encoded_payload_patterns() -> Vec<Pattern> {
    vec![
        Pattern::seed(
            "seed-en-001",
            "Long Base64 Run",
            r"[A-Za-z0-9+/]{60,}={0,2}",
            ThreatCategory::EncodedPayload,
            0.65,
        )
        .with_predicate(StructuralPredicate {
            min_length: Some(80),
            requires_token: None,
        }),
        Pattern::seed(
            "seed-en-002",
            "Zero-Width Characters",
            r"[\u{200B}\u{200C}\u{200D}\u{FEFF}]",
            ThreatCategory::EncodedPayload,
            0.85,
        ),
        Pattern::seed(
            "seed-en-003",
            "Long Hex Blob",
            r"(?i)(0x)?[0-9a-f]{64,}",
            ThreatCategory::EncodedPayload,
            0.60,
        ),
    ]
}
