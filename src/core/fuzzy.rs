//! token-set 相似度打分，用于把自由文本的过滤值对齐到列的真实取值。

use std::collections::BTreeSet;

/// 预处理：转小写，非字母数字替换为空格，去首尾空白
pub fn normalize(s: &str) -> String {
    let mapped: String = s
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_lowercase().next().unwrap_or(c) } else { ' ' })
        .collect();
    mapped.trim().to_string()
}

/// 归一化 Indel 相似度：2 * LCS / (len_a + len_b)，0..=100
pub fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 100.0;
    }
    let lcs = lcs_len(&a, &b);
    200.0 * lcs as f64 / total as f64
}

fn lcs_len(a: &[char], b: &[char]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut cur = vec![0usize; b.len() + 1];
    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            cur[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                cur[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

/// token-set 相似度：交集完全覆盖任一方时记 100，
/// 否则取 (交集, 交集+差集A, 交集+差集B) 两两比较的最大值
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let a = normalize(a);
    let b = normalize(b);
    let ta: BTreeSet<&str> = a.split_whitespace().collect();
    let tb: BTreeSet<&str> = b.split_whitespace().collect();
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }

    let sect: Vec<&str> = ta.intersection(&tb).copied().collect();
    let diff_ab: Vec<&str> = ta.difference(&tb).copied().collect();
    let diff_ba: Vec<&str> = tb.difference(&ta).copied().collect();

    if !sect.is_empty() && (diff_ab.is_empty() || diff_ba.is_empty()) {
        return 100.0;
    }

    let sect_str = sect.join(" ");
    let join = |diff: &[&str]| {
        if sect_str.is_empty() {
            diff.join(" ")
        } else {
            format!("{} {}", sect_str, diff.join(" "))
        }
    };
    let combined_ab = join(&diff_ab);
    let combined_ba = join(&diff_ba);

    let mut best = ratio(&combined_ab, &combined_ba);
    if !sect_str.is_empty() {
        best = best
            .max(ratio(&sect_str, &combined_ab))
            .max(ratio(&sect_str, &combined_ba));
    }
    best
}

/// 在候选值中找最相似的一个；并列取最先出现者
pub fn best_match<'a>(input: &str, choices: &'a [String]) -> Option<(&'a str, f64)> {
    let mut best: Option<(&'a str, f64)> = None;
    for choice in choices {
        let score = token_set_ratio(input, choice);
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((choice.as_str(), score));
        }
    }
    best
}
