//! The routing table: an ordered list of rules separated by phase markers.
//!
//! Order is meaning. A consumer evaluates rules top to bottom, one phase at
//! a time; `continue` rules apply and keep going, `override` rules may
//! replace an earlier match. [RouteTableBuilder] only lets phases move
//! forward and fills in markers for phases without rules, so every table
//! carries each [Phase] marker exactly once and in order.

use indexmap::IndexMap;
use lambdapack_manifest::Has;
use serde::{Deserialize, Serialize};

use crate::Error;

mod synth;

pub use synth::{ErrorPages, RoutingInput, RoutingSynthesizer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Redirects,
    Middleware,
    BeforeFiles,
    Filesystem,
    AfterFiles,
    Resource,
    Fallback,
    Miss,
    Rewrite,
    Hit,
    Error,
}

impl Phase {
    pub const ALL: [Phase; 11] = [
        Phase::Redirects,
        Phase::Middleware,
        Phase::BeforeFiles,
        Phase::Filesystem,
        Phase::AfterFiles,
        Phase::Resource,
        Phase::Fallback,
        Phase::Miss,
        Phase::Rewrite,
        Phase::Hit,
        Phase::Error,
    ];
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Locale negotiation for a rule: locale -> redirect target, plus the
/// cookie that pins a locale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocaleRedirect {
    pub redirect: IndexMap<String, String>,
    pub cookie: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRule {
    pub src: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub headers: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(rename = "continue", default, skip_serializing_if = "is_false")]
    pub continue_matching: bool,
    #[serde(rename = "override", default, skip_serializing_if = "is_false")]
    pub overrides_prior: bool,
    /// Re-check the filesystem after rewriting.
    #[serde(default, skip_serializing_if = "is_false")]
    pub check: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub important: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub case_sensitive: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub has: Vec<Has>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<Has>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<LocaleRedirect>,
}

impl RouteRule {
    pub fn new(src: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            ..Default::default()
        }
    }

    pub fn dest(mut self, dest: impl Into<String>) -> Self {
        self.dest = Some(dest.into());
        self
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn continue_matching(mut self) -> Self {
        self.continue_matching = true;
        self
    }

    pub fn overrides_prior(mut self) -> Self {
        self.overrides_prior = true;
        self
    }

    pub fn check(mut self) -> Self {
        self.check = true;
        self
    }

    pub fn important(mut self) -> Self {
        self.important = true;
        self
    }

    pub fn case_sensitive(mut self) -> Self {
        self.case_sensitive = true;
        self
    }

    pub fn has(mut self, has: Vec<Has>) -> Self {
        self.has = has;
        self
    }

    pub fn missing(mut self, missing: Vec<Has>) -> Self {
        self.missing = missing;
        self
    }

    pub fn locale(mut self, locale: LocaleRedirect) -> Self {
        self.locale = Some(locale);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Route {
    Handle { handle: Phase },
    Rule(RouteRule),
}

/// Appends rules phase by phase. See the module docs.
#[derive(Debug, Default)]
pub struct RouteTableBuilder {
    routes: Vec<Route>,
    phase: Option<Phase>,
}

impl RouteTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves to `phase`, emitting markers for it and any skipped phase.
    /// Entering the current phase again is a no-op; going back is an error.
    pub fn enter(&mut self, phase: Phase) -> Result<&mut Self, Error> {
        match self.phase {
            Some(current) if current == phase => return Ok(self),
            Some(current) if current > phase => {
                return Err(Error::PhaseOrder {
                    current,
                    requested: phase,
                })
            }
            _ => {}
        }

        self.mark_through(phase);
        Ok(self)
    }

    /// Emits markers for every phase after the current one up to `phase`.
    fn mark_through(&mut self, phase: Phase) {
        for next in Phase::ALL {
            if next > phase {
                break;
            }
            if self.phase.is_some_and(|current| next <= current) {
                continue;
            }
            self.routes.push(Route::Handle { handle: next });
        }
        self.phase = Some(phase);
    }

    /// Appends a rule to the current phase (the first phase if none was
    /// entered yet).
    pub fn push(&mut self, rule: RouteRule) -> &mut Self {
        if self.phase.is_none() {
            self.routes.push(Route::Handle {
                handle: Phase::Redirects,
            });
            self.phase = Some(Phase::Redirects);
        }
        self.routes.push(Route::Rule(rule));
        self
    }

    pub fn extend(&mut self, rules: impl IntoIterator<Item = RouteRule>) -> &mut Self {
        for rule in rules {
            self.push(rule);
        }
        self
    }

    /// Emits the remaining phase markers and returns the table.
    pub fn finish(mut self) -> RouteTable {
        self.mark_through(Phase::Error);
        RouteTable {
            routes: self.routes,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Phase markers in table order.
    pub fn phases(&self) -> Vec<Phase> {
        self.routes
            .iter()
            .filter_map(|r| match r {
                Route::Handle { handle } => Some(*handle),
                Route::Rule(_) => None,
            })
            .collect()
    }

    /// Rules of `phase`, in order.
    pub fn rules_in(&self, phase: Phase) -> Vec<&RouteRule> {
        let mut current = None;
        let mut out = Vec::new();
        for route in &self.routes {
            match route {
                Route::Handle { handle } => current = Some(*handle),
                Route::Rule(rule) if current == Some(phase) => out.push(rule),
                Route::Rule(_) => {}
            }
        }
        out
    }

    /// Checks the marker contract for tables not produced by
    /// [RouteTableBuilder], e.g. loaded back from JSON: markers strictly
    /// increase and no rule precedes the first marker.
    pub fn validate(&self) -> Result<(), Error> {
        let mut current: Option<Phase> = None;
        for route in &self.routes {
            match (route, current) {
                (Route::Handle { handle }, Some(prev)) if *handle <= prev => {
                    return Err(Error::PhaseOrder {
                        current: prev,
                        requested: *handle,
                    });
                }
                (Route::Handle { handle }, _) => current = Some(*handle),
                (Route::Rule(_), None) => {
                    return Err(Error::PhaseOrder {
                        current: Phase::Redirects,
                        requested: Phase::Redirects,
                    });
                }
                (Route::Rule(_), Some(_)) => {}
            }
        }
        Ok(())
    }
}

/// Evaluation the way a dispatcher would, for checking synthesized tables.
#[cfg(test)]
mod eval {
    use fancy_regex::{Regex, RegexBuilder};
    use lambdapack_manifest::Has;

    use super::{Phase, RouteRule, RouteTable};

    /// Whether `has` holds for a request carrying only `headers`. Such a
    /// request has no cookies, query or host.
    fn holds(has: &Has, headers: &[(&str, &str)]) -> bool {
        match has {
            Has::Header { key, value } => headers.iter().any(|(name, v)| {
                name.eq_ignore_ascii_case(key)
                    && value.as_deref().map_or(true, |value| value == *v)
            }),
            Has::Cookie { .. } | Has::Query { .. } | Has::Host { .. } => false,
        }
    }

    impl RouteRule {
        /// Compiles `src` the way the dispatcher anchors it: whole path,
        /// case-insensitive unless marked otherwise. Lookarounds are supported.
        pub fn regex(&self) -> Result<Regex, fancy_regex::Error> {
            RegexBuilder::new(&format!("^(?:{})$", self.src))
                .case_insensitive(!self.case_sensitive)
                .build()
        }

        /// Whether `has` and `missing` hold for a request carrying `headers`.
        pub fn conditions_hold(&self, headers: &[(&str, &str)]) -> bool {
            self.has.iter().all(|has| holds(has, headers))
                && !self.missing.iter().any(|missing| holds(missing, headers))
        }

        /// If `src` matches `path`, returns `dest` with captures expanded, or
        /// the path itself for rules without a destination. Ignores `has` and
        /// `missing`.
        pub fn apply(&self, path: &str) -> Result<Option<String>, fancy_regex::Error> {
            let regex = self.regex()?;
            let Some(captures) = regex.captures(path)? else {
                return Ok(None);
            };

            let Some(dest) = &self.dest else {
                return Ok(Some(path.to_string()));
            };
            let mut out = String::new();
            captures.expand(dest, &mut out);
            Ok(Some(out))
        }
    }

    impl RouteTable {
        /// The first rule in `phase` whose conditions hold for `headers` and
        /// whose `src` matches `path`, with its expanded destination. Rules
        /// whose source doesn't compile are skipped.
        pub fn first_match(
            &self,
            phase: Phase,
            path: &str,
            headers: &[(&str, &str)],
        ) -> Option<(&RouteRule, String)> {
            self.rules_in(phase)
                .into_iter()
                .filter(|rule| rule.conditions_hold(headers))
                .find_map(|rule| match rule.apply(path) {
                    Ok(Some(dest)) => Some((rule, dest)),
                    Ok(None) | Err(_) => None,
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Phase, Route, RouteRule, RouteTable, RouteTableBuilder};
    use crate::Error;
    use lambdapack_manifest::Has;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_table_has_every_marker() {
        let table = RouteTableBuilder::new().finish();
        assert_eq!(Phase::ALL.to_vec(), table.phases());
        assert!(table.validate().is_ok());
    }

    #[test]
    fn skipped_phases_are_filled_in() {
        let mut builder = RouteTableBuilder::new();
        builder.push(RouteRule::new("/a").dest("/b"));
        builder
            .enter(Phase::Miss)
            .unwrap()
            .push(RouteRule::new("/c").status(404));
        builder.enter(Phase::Miss).unwrap();
        let table = builder.finish();

        assert_eq!(Phase::ALL.to_vec(), table.phases());
        assert_eq!("/a", table.rules_in(Phase::Redirects)[0].src);
        assert_eq!("/c", table.rules_in(Phase::Miss)[0].src);
        assert!(table.rules_in(Phase::Filesystem).is_empty());
    }

    #[test]
    fn finishing_in_the_last_phase_adds_no_marker() {
        let mut builder = RouteTableBuilder::new();
        builder
            .enter(Phase::Error)
            .unwrap()
            .push(RouteRule::new("/.*").status(404));
        let table = builder.finish();

        assert_eq!(Phase::ALL.to_vec(), table.phases());
        assert_eq!(1, table.rules_in(Phase::Error).len());
        assert!(table.validate().is_ok());
    }

    #[test]
    fn going_back_fails() {
        let mut builder = RouteTableBuilder::new();
        builder.enter(Phase::Hit).unwrap();
        let err = builder.enter(Phase::Filesystem).expect_err("must fail");
        assert!(matches!(
            err,
            Error::PhaseOrder {
                current: Phase::Hit,
                requested: Phase::Filesystem
            }
        ));
    }

    #[test]
    fn serializes_like_the_dispatcher_expects() {
        let mut builder = RouteTableBuilder::new();
        builder.push(
            RouteRule::new("^/old$")
                .header("Location", "/new")
                .status(308),
        );
        builder
            .enter(Phase::Hit)
            .unwrap()
            .push(RouteRule::new("/x").header("a", "b").continue_matching().important());
        let json = serde_json::to_value(builder.finish()).unwrap();

        assert_eq!(serde_json::json!({ "handle": "redirects" }), json[0]);
        assert_eq!(
            serde_json::json!({ "src": "^/old$", "headers": { "Location": "/new" }, "status": 308 }),
            json[1]
        );
        assert_eq!(serde_json::json!({ "handle": "beforeFiles" }), json[3]);
        let hit = json
            .as_array()
            .unwrap()
            .iter()
            .position(|r| r == &serde_json::json!({ "handle": "hit" }))
            .unwrap();
        assert_eq!(
            serde_json::json!({ "src": "/x", "headers": { "a": "b" }, "continue": true, "important": true }),
            json[hit + 1]
        );
    }

    #[test]
    fn validate_rejects_reordered_tables() {
        let table: RouteTable = serde_json::from_str(
            r#"[{ "handle": "filesystem" }, { "src": "/a" }, { "handle": "redirects" }]"#,
        )
        .unwrap();
        assert!(matches!(table.validate(), Err(Error::PhaseOrder { .. })));

        let table: RouteTable = serde_json::from_str(r#"[{ "src": "/a" }]"#).unwrap();
        assert!(table.validate().is_err());

        let table: RouteTable =
            serde_json::from_str(r#"[{ "handle": "redirects" }, { "src": "/a", "continue": true }]"#)
                .unwrap();
        assert!(table.validate().is_ok());
        assert!(matches!(&table.routes()[1], Route::Rule(r) if r.continue_matching));
    }

    #[test]
    fn apply_expands_captures() {
        let rule = RouteRule::new("/(?<nextLocale>en|fr)(/.*|$)").dest("/$nextLocale/404");
        assert_eq!(Some("/fr/404".to_string()), rule.apply("/fr/missing").unwrap());
        assert_eq!(None, rule.apply("/de/missing").unwrap());

        let rule = RouteRule::new("^/blog/(?<slug>[^/]+?)(?:/)?$").dest("/blog/[slug]?slug=$slug");
        assert_eq!(
            Some("/blog/[slug]?slug=hello".to_string()),
            rule.apply("/blog/hello").unwrap()
        );
    }

    #[test]
    fn apply_evaluates_lookarounds() {
        let rule = RouteRule::new("^/(?!(?:_next/.*|en|fr)(?:/.*|$))(.*)$").dest("/en/$1");
        assert_eq!(Some("/en/about".to_string()), rule.apply("/about").unwrap());
        assert_eq!(None, rule.apply("/fr/about").unwrap());
        assert_eq!(None, rule.apply("/_next/static/x").unwrap());
    }

    #[test]
    fn conditions_only_see_headers() {
        let rule = RouteRule::new("/a")
            .has(vec![Has::Header {
                key: "x-nextjs-data".into(),
                value: None,
            }])
            .missing(vec![Has::Cookie {
                key: "__prerender_bypass".into(),
                value: None,
            }]);
        assert!(rule.conditions_hold(&[("X-Nextjs-Data", "1")]));
        assert!(!rule.conditions_hold(&[]));

        let rule = RouteRule::new("/a").has(vec![Has::Header {
            key: "x-mode".into(),
            value: Some("draft".into()),
        }]);
        assert!(rule.conditions_hold(&[("x-mode", "draft")]));
        assert!(!rule.conditions_hold(&[("x-mode", "live")]));

        let rule = RouteRule::new("/a").has(vec![Has::Query {
            key: "q".into(),
            value: None,
        }]);
        assert!(!rule.conditions_hold(&[("q", "1")]));
    }
}
