//! Robots.txt parser and checker.
//!
//! Only `User-agent` and `Disallow` are honored. Rules come from the first
//! group whose user-agent applies to us (`*`, or a token containing "bot" or
//! "spider"); later applicable groups are not merged in. This is looser than
//! the de facto standard and is kept deliberately.

/// One `User-agent` group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct AgentGroup {
    /// Lowercased user-agent tokens
    agents: Vec<String>,

    /// Non-empty disallowed path prefixes
    disallow: Vec<String>,
}

impl AgentGroup {
    fn applies(&self) -> bool {
        self.agents.iter().any(|agent| is_applicable_agent(agent))
    }
}

/// Whether a user-agent token is treated as addressing this crawler.
pub fn is_applicable_agent(agent: &str) -> bool {
    let agent = agent.trim().to_lowercase();
    agent == "*" || agent.contains("bot") || agent.contains("spider")
}

/// Parsed robots.txt rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RobotsTxt {
    groups: Vec<AgentGroup>,
}

impl RobotsTxt {
    /// Parse robots.txt content.
    pub fn parse(content: &str) -> Self {
        let mut groups: Vec<AgentGroup> = Vec::new();
        let mut current = AgentGroup::default();
        let mut in_rules = false;

        for line in content.lines() {
            // Strip comments
            let line = line.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }

            let Some((directive, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();

            match directive.trim().to_lowercase().as_str() {
                "user-agent" => {
                    // A user-agent after rules starts a new group
                    if in_rules {
                        groups.push(std::mem::take(&mut current));
                        in_rules = false;
                    }
                    current.agents.push(value.to_lowercase());
                }
                "disallow" => {
                    in_rules = true;
                    if !value.is_empty() {
                        current.disallow.push(value.to_string());
                    }
                }
                _ => {}
            }
        }

        if !current.agents.is_empty() {
            groups.push(current);
        }

        Self { groups }
    }

    /// Disallow rules of the first applicable group.
    pub fn applicable_rules(&self) -> &[String] {
        self.groups
            .iter()
            .find(|group| group.applies())
            .map(|group| group.disallow.as_slice())
            .unwrap_or(&[])
    }

    /// The rule blocking `path`, if any.
    pub fn blocking_rule(&self, path: &str) -> Option<&str> {
        self.applicable_rules()
            .iter()
            .find(|rule| rule.as_str() == "/" || path.starts_with(rule.as_str()))
            .map(String::as_str)
    }

    /// Check if a path is allowed.
    pub fn is_allowed(&self, path: &str) -> bool {
        self.blocking_rule(path).is_none()
    }

    /// Check if robots.txt disallows all crawling.
    pub fn disallows_all(&self) -> bool {
        self.applicable_rules().iter().any(|rule| rule == "/")
    }
}
