/// Default command risk patterns, used when a manifest is absent or a
/// command isn't covered by one. Evaluated read, then write, then high-risk;
/// first match wins within each group.
pub const READ_PATTERNS: &[&str] = &[
    r"^ls\b",
    r"^cat\b",
    r"^head\b",
    r"^tail\b",
    r"^grep\b",
    r"^find\b.*-type",
    r"^pwd$",
    r"^which\b",
    r"^echo\b",
    r"^git status\b",
    r"^git log\b",
    r"^git diff\b",
    r"^wc\b",
    r"^file\b",
    r"^tree\b",
    r"^less\b",
    r"^more\b",
];

pub const WRITE_PATTERNS: &[&str] = &[
    r"^mkdir\b",
    r"^touch\b",
    r"^cp\b",
    r"^mv\b",
    r"^git add\b",
    r"^git commit\b",
    r"^npm install\b",
    r"^pip install\b",
    r"^cargo build\b",
    r"^make\b",
    r"^npm run\b",
    r"^yarn\b",
    r"^pnpm\b",
];

/// Includes `.*>.*`, which matches any command containing `>` anywhere in
/// its text. Reproduced literally rather than tightened; see DESIGN.md.
pub const HIGH_RISK_PATTERNS: &[&str] = &[
    r"^rm\b",
    r"^rmdir\b",
    r"^git push\b",
    r"^git reset --hard\b",
    r"^curl\b",
    r"^wget\b",
    r"^ssh\b",
    r"^scp\b",
    r"^chmod\b",
    r"^chown\b",
    r"^sudo\b",
    r".*\|.*rm\b",
    r".*>.*",
];

/// Commands never allowed, regardless of manifest or mode.
pub const BLOCKLIST_PATTERNS: &[&str] = &[
    r"^rm\s+-rf\s+/",
    r"^:()\{\s*:\s*\|\s*:\s*&\s*\}\s*;:",
    r"^dd\s+if=.*of=/",
    r".*eval\s+\$",
    r"^pkill\b",
    r"^killall\b",
    r".*&&\s*rm\b",
];
