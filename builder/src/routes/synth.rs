use indexmap::IndexMap;
use lambdapack_manifest::{DataRoute, DynamicRoute, Has, Rewrite, Routes};

use super::{LocaleRedirect, Phase, RouteRule, RouteTable, RouteTableBuilder};
use crate::page::is_dynamic;
use crate::Error;

const IMMUTABLE: &str = "public,max-age=31536000,immutable";
const LOCALE_COOKIE: &str = "NEXT_LOCALE";

/// Which custom error pages the build can serve, statically or from a
/// function.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ErrorPages {
    pub has_404: bool,
    pub has_500: bool,
}

pub struct RoutingInput<'a> {
    pub routes: &'a Routes,
    pub build_id: &'a str,
    pub error_pages: ErrorPages,
}

/// Emits the routing table for one build.
pub struct RoutingSynthesizer<'a> {
    routes: &'a Routes,
    build_id: &'a str,
    error_pages: ErrorPages,
    base: &'a str,
    /// `en|fr|...`, escaped. None without i18n.
    locales: Option<String>,
}

impl<'a> RoutingSynthesizer<'a> {
    pub fn new(input: RoutingInput<'a>) -> Self {
        let locales = input.routes.i18n().map(|i18n| {
            i18n.locales
                .iter()
                .map(|l| regex::escape(l))
                .collect::<Vec<_>>()
                .join("|")
        });
        Self {
            routes: input.routes,
            build_id: input.build_id,
            error_pages: input.error_pages,
            base: input.routes.base_path(),
            locales,
        }
    }

    pub fn synthesize(&self) -> Result<RouteTable, Error> {
        let mut table = RouteTableBuilder::new();

        table.enter(Phase::Redirects)?;
        self.redirects(&mut table);

        table.enter(Phase::Middleware)?;

        table.enter(Phase::BeforeFiles)?;
        table.extend(self.denormalize_data_routes());
        table.extend(
            self.routes
                .rewrites
                .before_files
                .iter()
                .map(|r| rewrite(r).continue_matching().overrides_prior()),
        );

        table.enter(Phase::Filesystem)?;
        if !self.base.is_empty() {
            table.push(
                RouteRule::new(format!("^{}/_next/image/?$", self.base))
                    .dest("/_next/image")
                    .check(),
            );
        }

        table.enter(Phase::AfterFiles)?;
        table.extend(self.routes.rewrites.after_files.iter().map(|r| rewrite(r).check()));

        table.enter(Phase::Resource)?;

        table.enter(Phase::Fallback)?;
        table.extend(self.routes.rewrites.fallback.iter().map(|r| rewrite(r).check()));
        table.push(RouteRule::new(format!("^{}/.*$", self.base)).status(404));

        table.enter(Phase::Miss)?;
        self.miss(&mut table);

        table.enter(Phase::Rewrite)?;
        table.extend(self.renormalize_data_routes());
        let data_routes = &self.routes.common.data_routes;
        let (dynamic, fixed): (Vec<&DataRoute>, Vec<&DataRoute>) =
            data_routes.iter().partition(|r| is_dynamic(&r.page));
        table.extend(fixed.into_iter().chain(dynamic).map(|r| self.data_route(r)));
        table.extend(
            self.routes
                .common
                .dynamic_routes
                .iter()
                .map(|r| self.dynamic_route(r)),
        );

        table.enter(Phase::Hit)?;
        self.hit(&mut table);

        table.enter(Phase::Error)?;
        self.error_chain(&mut table, 404, self.error_pages.has_404);
        self.error_chain(&mut table, 500, self.error_pages.has_500);

        Ok(table.finish())
    }

    fn redirects(&self, table: &mut RouteTableBuilder) {
        let redirect = |r: &lambdapack_manifest::Redirect| {
            RouteRule::new(&r.regex)
                .header("Location", convert_destination(&r.source, &r.destination))
                .status(r.status())
                .has(r.has.clone())
                .missing(r.missing.clone())
        };

        // Trailing slash redirects go first so they apply before locale
        // handling.
        let redirects = &self.routes.common.redirects;
        table.extend(redirects.iter().filter(|r| r.internal).map(redirect));

        for rule in &self.routes.common.headers {
            let mut route = RouteRule::new(&rule.regex)
                .continue_matching()
                .has(rule.has.clone())
                .missing(rule.missing.clone());
            for header in &rule.headers {
                route = route.header(
                    convert_destination(&rule.source, &header.key),
                    convert_destination(&rule.source, &header.value),
                );
            }
            table.push(route);
        }

        table.extend(redirects.iter().filter(|r| !r.internal).map(redirect));

        let (Some(i18n), Some(locales)) = (self.routes.i18n(), &self.locales) else {
            return;
        };
        let base = self.base;
        let default = &i18n.default_locale;

        if i18n.detects_locale() {
            let redirect: IndexMap<String, String> = i18n
                .locales
                .iter()
                .map(|l| {
                    let target = if l == default {
                        format!("{base}/")
                    } else {
                        format!("{base}/{l}")
                    };
                    (l.clone(), target)
                })
                .collect();
            table.push(
                RouteRule::new(format!("^{base}/?$"))
                    .locale(LocaleRedirect {
                        redirect,
                        cookie: LOCALE_COOKIE.to_string(),
                    })
                    .continue_matching(),
            );
        }

        table.push(
            RouteRule::new(format!("^{base}/?$"))
                .dest(format!("{base}/{default}"))
                .continue_matching(),
        );
        table.push(
            RouteRule::new(format!(
                "^{base}/(?!(?:_next/.*|{locales})(?:/.*|$))(.*)$"
            ))
            .dest(format!("{base}/{default}/$1"))
            .continue_matching(),
        );
    }

    fn data_header() -> Vec<Has> {
        vec![Has::Header {
            key: "x-nextjs-data".to_string(),
            value: None,
        }]
    }

    fn escaped_build_id(&self) -> String {
        regex::escape(self.build_id)
    }

    /// `/_next/data/<id>/about.json` -> `/about`, for data requests.
    fn denormalize_data_routes(&self) -> Vec<RouteRule> {
        let base = self.base;
        vec![
            RouteRule::new(format!(
                "^{base}/_next/data/{}/(.*)\\.json$",
                self.escaped_build_id()
            ))
            .dest(format!("{base}/$1"))
            .has(Self::data_header())
            .continue_matching()
            .overrides_prior(),
            RouteRule::new(format!("^{base}/index(?:/)?$"))
                .dest(if base.is_empty() { "/" } else { base })
                .has(Self::data_header())
                .continue_matching()
                .overrides_prior(),
        ]
    }

    /// The inverse of [Self::denormalize_data_routes], once user rewrites
    /// have run.
    fn renormalize_data_routes(&self) -> Vec<RouteRule> {
        let (base, id) = (self.base, self.build_id);
        vec![
            RouteRule::new(format!("^{base}/?$"))
                .dest(format!("{base}/_next/data/{id}/index.json"))
                .has(Self::data_header())
                .continue_matching(),
            RouteRule::new(format!("^{base}/((?!_next/)(?:.*[^/]|.*))/?$"))
                .dest(format!("{base}/_next/data/{id}/$1.json"))
                .has(Self::data_header())
                .continue_matching(),
        ]
    }

    fn miss(&self, table: &mut RouteTableBuilder) {
        let base = self.base;
        table.push(
            RouteRule::new(format!(
                "^{base}/_next/static/(?:[^/]+/pages|pages|chunks|runtime|css|image|media)/.+$"
            ))
            .status(404)
            .check()
            .dest("$0"),
        );
        if let Some(locales) = &self.locales {
            // Public files aren't locale-prefixed.
            table.push(
                RouteRule::new(format!("^{base}/?(?:{locales})/(.*)$"))
                    .dest(format!("{base}/$1"))
                    .check(),
            );
        }
    }

    fn data_route(&self, route: &DataRoute) -> RouteRule {
        let (base, id) = (self.base, self.build_id);
        let mut src = route
            .named_data_route_regex
            .clone()
            .unwrap_or_else(|| route.data_route_regex.clone());
        let mut locale = "";

        if let Some(locales) = &self.locales {
            locale = "/$nextLocale";
            let prefix = format!("^{base}/_next/data/");
            if let Some(at) = src
                .strip_prefix(&prefix)
                .and_then(|rest| rest.find('/'))
                .map(|i| prefix.len() + i + 1)
            {
                src = if route.page == "/" {
                    format!("{}(?<nextLocale>{locales})\\.json$", &src[..at])
                } else {
                    format!("{}(?<nextLocale>{locales})/{}", &src[..at], &src[at..])
                };
            }
        }

        let page = match (route.page.as_str(), locale) {
            ("/", "") => "/index",
            ("/", _) => "",
            (page, _) => page,
        };
        RouteRule::new(src)
            .dest(format!(
                "{base}/_next/data/{id}{locale}{page}.json{}",
                query(route.route_keys.as_ref())
            ))
            .check()
    }

    fn dynamic_route(&self, route: &DynamicRoute) -> RouteRule {
        let base = self.base;
        let (src, keys) = match &route.named_regex {
            Some(named) => (named.as_str(), route.route_keys.as_ref()),
            None => (route.regex.as_str(), None),
        };

        let (src, locale) = match &self.locales {
            Some(locales) => (
                src.replacen('^', &format!("^{base}[/]?(?<nextLocale>{locales})"), 1),
                "/$nextLocale",
            ),
            None => (src.replacen('^', &format!("^{base}"), 1), ""),
        };

        RouteRule::new(src)
            .dest(format!("{base}{locale}{}{}", route.page, query(keys)))
            .check()
    }

    fn hit(&self, table: &mut RouteTableBuilder) {
        let base = self.base;
        // Only files the framework fingerprints can be cached forever.
        table.push(
            RouteRule::new(format!(
                "^{base}/_next/static/(?:[^/]+/pages|pages|chunks|runtime|css|image|media|{})/.+$",
                self.escaped_build_id()
            ))
            .header("cache-control", IMMUTABLE)
            .continue_matching()
            .important(),
        );
        table.push(
            RouteRule::new(format!("^{base}/index(?:/)?$"))
                .header("x-matched-path", "/")
                .continue_matching()
                .important(),
        );
        table.push(
            RouteRule::new(format!("^{base}/((?!index$).*?)(?:/)?$"))
                .header("x-matched-path", "/$1")
                .continue_matching()
                .important(),
        );
    }

    /// Per-locale page, then the default locale's page, then the framework
    /// error page.
    fn error_chain(&self, table: &mut RouteTableBuilder, status: u16, has_page: bool) {
        let base = self.base;
        match (self.routes.i18n(), &self.locales, has_page) {
            (Some(i18n), Some(locales), true) => {
                table.push(
                    RouteRule::new(format!("^{base}/(?<nextLocale>{locales})(/.*|$)"))
                        .dest(format!("{base}/$nextLocale/{status}"))
                        .status(status)
                        .case_sensitive(),
                );
                table.push(
                    RouteRule::new(format!("^{base}/.*$"))
                        .dest(format!("{base}/{}/{status}", i18n.default_locale))
                        .status(status),
                );
            }
            (_, _, has_page) => {
                let page = if has_page {
                    status.to_string()
                } else {
                    "_error".to_string()
                };
                table.push(
                    RouteRule::new(format!("^{base}/.*$"))
                        .dest(format!("{base}/{page}"))
                        .status(status),
                );
            }
        }
    }
}

fn rewrite(r: &Rewrite) -> RouteRule {
    RouteRule::new(&r.regex)
        .dest(convert_destination(&r.source, &r.destination))
        .has(r.has.clone())
        .missing(r.missing.clone())
}

/// `?slug=$nxtPslug&...` from group name -> query key.
fn query(route_keys: Option<&IndexMap<String, String>>) -> String {
    match route_keys {
        Some(keys) if !keys.is_empty() => format!(
            "?{}",
            keys.iter()
                .map(|(group, key)| format!("{key}=${group}"))
                .collect::<Vec<_>>()
                .join("&")
        ),
        _ => String::new(),
    }
}

/// Names of the `:params` of a source pattern, in order.
fn source_params(source: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut rest = source;
    while let Some(at) = rest.find(':') {
        rest = &rest[at + 1..];
        let len = param_len(rest);
        if len > 0 {
            out.push(&rest[..len]);
        }
        rest = &rest[len..];
    }
    out
}

fn param_len(s: &str) -> usize {
    let mut chars = s.char_indices();
    match chars.next() {
        Some((_, c)) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return 0,
    }
    chars
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_'))
        .map_or(s.len(), |(i, _)| i)
}

/// Rewrites `:param` references in `destination` to the positional capture
/// of that param in the source regex. Unknown names are left alone.
fn convert_destination(source: &str, destination: &str) -> String {
    let params = source_params(source);
    let mut out = String::with_capacity(destination.len());
    let mut rest = destination;

    while let Some(at) = rest.find(':') {
        out.push_str(&rest[..at]);
        rest = &rest[at + 1..];
        let len = param_len(rest);
        match params.iter().position(|p| *p == &rest[..len]) {
            Some(index) if len > 0 => {
                out.push_str(&format!("${}", index + 1));
                rest = rest[len..].trim_start_matches(['*', '+', '?']);
            }
            _ => out.push(':'),
        }
    }
    out.push_str(rest);
    out
}
