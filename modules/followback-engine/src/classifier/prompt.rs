use followback_common::Profile;

pub const SYSTEM_PROMPT: &str = "\
You decide whether a social media account belongs to a technical professional.

Categories:
- ENGINEER: software engineers, developers, programmers, DevOps/SRE
- RESEARCHER: AI/ML researchers, data scientists, research scientists
- ACADEMIC: professors, PhD students, university researchers
- TECH_LEADER: CTOs, VPs of engineering, technical founders, tech leads
- TECH_WORKER: other people working in technology
- OTHER: everyone else

ENGINEER, RESEARCHER, ACADEMIC, TECH_LEADER and TECH_WORKER accounts are immune.
When the profile is ambiguous or you are unsure, choose immune=true.

Reply with JSON only: category, immune, confidence (0.0 to 1.0), reasoning (one short sentence).";

/// Instruction body for one profile.
pub fn user_prompt(profile: &Profile) -> String {
    format!(
        "Classify this account.\n\n\
         Handle: @{handle}\n\
         Display name: {name}\n\
         Bio: {bio}\n\
         Location: {location}",
        handle = profile.handle,
        name = profile.display_name,
        bio = profile.bio,
        location = profile.location,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embeds_every_profile_field() {
        let profile = Profile {
            handle: "ada".into(),
            display_name: "Ada L.".into(),
            bio: "Analytical engines".into(),
            location: "London".into(),
            ..Profile::empty("1".into())
        };
        let prompt = user_prompt(&profile);
        for needle in ["@ada", "Ada L.", "Analytical engines", "London"] {
            assert!(prompt.contains(needle), "missing {needle}");
        }
    }

    #[test]
    fn system_prompt_defaults_to_immune() {
        assert!(SYSTEM_PROMPT.contains("immune=true"));
        assert!(SYSTEM_PROMPT.contains("ambiguous"));
    }
}
