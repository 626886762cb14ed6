/// Escape literal document text for LaTeX. Every character with a special
/// meaning is escaped exactly once; everything else passes through, except
/// the Unicode math symbols and spacing characters below.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    for ch in text.chars() {
        match ch {
            '#' | '$' | '%' | '&' | '_' | '{' | '}' => {
                out.push('\\');
                out.push(ch);
            }
            '~' => out.push_str("\\textasciitilde{}"),
            '^' => out.push_str("\\textasciicircum{}"),
            '\\' => out.push_str("\\textbackslash{}"),
            '\u{00A0}' => out.push('~'),
            c => match unicode_replacement(c) {
                Some(replacement) => out.push_str(replacement),
                None => out.push(c),
            },
        }
    }
    out
}

/// Escape a URL for the first argument of `\href`.
pub fn escape_url(url: &str) -> String {
    let mut out = String::with_capacity(url.len());
    for ch in url.chars() {
        match ch {
            '%' => out.push_str("\\%"),
            '#' => out.push_str("\\#"),
            '{' => out.push_str("\\%7B"),
            '}' => out.push_str("\\%7D"),
            '\\' => out.push_str("\\%5C"),
            ' ' => out.push_str("\\%20"),
            c => out.push(c),
        }
    }
    out
}

/// Characters pdflatex cannot typeset from UTF-8 input without extra
/// packages. Greek letters and operators go to math mode.
fn unicode_replacement(c: char) -> Option<&'static str> {
    let r = match c {
        // spacing
        '\u{2002}' | '\u{2003}' | '\u{2004}' | '\u{2005}' | '\u{2006}' | '\u{2008}'
        | '\u{2009}' | '\u{200A}' | '\u{202F}' => " ",
        '\u{200B}' | '\u{FEFF}' => "",
        '\u{2212}' | '\u{2010}' | '\u{2011}' => "-",
        // operators and relations
        '\u{2211}' => "$\\sum$",
        '\u{220F}' => "$\\prod$",
        '\u{222B}' => "$\\int$",
        '\u{2202}' => "$\\partial$",
        '\u{2207}' => "$\\nabla$",
        '\u{221A}' => "$\\surd$",
        '\u{221E}' => "$\\infty$",
        '\u{2248}' => "$\\approx$",
        '\u{2260}' => "$\\neq$",
        '\u{2264}' => "$\\leq$",
        '\u{2265}' => "$\\geq$",
        '\u{00B1}' => "$\\pm$",
        '\u{2213}' => "$\\mp$",
        '\u{00D7}' => "$\\times$",
        '\u{00F7}' => "$\\div$",
        '\u{22C5}' => "$\\cdot$",
        '\u{2208}' => "$\\in$",
        '\u{2209}' => "$\\notin$",
        '\u{2282}' => "$\\subset$",
        '\u{2283}' => "$\\supset$",
        '\u{2286}' => "$\\subseteq$",
        '\u{2287}' => "$\\supseteq$",
        '\u{222A}' => "$\\cup$",
        '\u{2229}' => "$\\cap$",
        '\u{2205}' => "$\\emptyset$",
        '\u{2200}' => "$\\forall$",
        '\u{2203}' => "$\\exists$",
        '\u{2225}' => "$\\parallel$",
        '\u{22A5}' => "$\\perp$",
        '\u{2220}' => "$\\angle$",
        '\u{00B0}' => "$^\\circ$",
        // arrows
        '\u{2192}' => "$\\rightarrow$",
        '\u{2190}' => "$\\leftarrow$",
        '\u{2194}' => "$\\leftrightarrow$",
        '\u{21D2}' => "$\\Rightarrow$",
        '\u{21D0}' => "$\\Leftarrow$",
        '\u{21D4}' => "$\\Leftrightarrow$",
        // Greek
        '\u{03B1}' => "$\\alpha$",
        '\u{03B2}' => "$\\beta$",
        '\u{03B3}' => "$\\gamma$",
        '\u{0393}' => "$\\Gamma$",
        '\u{03B4}' => "$\\delta$",
        '\u{0394}' => "$\\Delta$",
        '\u{03B5}' => "$\\varepsilon$",
        '\u{03B6}' => "$\\zeta$",
        '\u{03B7}' => "$\\eta$",
        '\u{03B8}' => "$\\theta$",
        '\u{0398}' => "$\\Theta$",
        '\u{03B9}' => "$\\iota$",
        '\u{03BA}' => "$\\kappa$",
        '\u{03BB}' => "$\\lambda$",
        '\u{039B}' => "$\\Lambda$",
        '\u{03BC}' => "$\\mu$",
        '\u{03BD}' => "$\\nu$",
        '\u{03BE}' => "$\\xi$",
        '\u{039E}' => "$\\Xi$",
        '\u{03C0}' => "$\\pi$",
        '\u{03A0}' => "$\\Pi$",
        '\u{03C1}' => "$\\rho$",
        '\u{03C3}' => "$\\sigma$",
        '\u{03A3}' => "$\\Sigma$",
        '\u{03C4}' => "$\\tau$",
        '\u{03C5}' => "$\\upsilon$",
        '\u{03A5}' => "$\\Upsilon$",
        '\u{03C6}' => "$\\varphi$",
        '\u{03A6}' => "$\\Phi$",
        '\u{03C7}' => "$\\chi$",
        '\u{03C8}' => "$\\psi$",
        '\u{03A8}' => "$\\Psi$",
        '\u{03C9}' => "$\\omega$",
        '\u{03A9}' => "$\\Omega$",
        _ => return None,
    };
    Some(r)
}
