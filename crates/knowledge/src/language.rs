//! Query language detection (Indonesian or English).
//!
//! A [`LanguageDetector`] is consulted first; when it cannot decide, the
//! signal-word count breaks the tie in favour of Indonesian.

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Languages the assistant answers in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    #[serde(rename = "id")]
    Indonesian,
    #[serde(rename = "en")]
    English,
}

impl Language {
    /// ISO 639-1 code.
    pub fn code(&self) -> &'static str {
        match self {
            Language::Indonesian => "id",
            Language::English => "en",
        }
    }

    /// Name used inside prompts.
    pub fn name(&self) -> &'static str {
        match self {
            Language::Indonesian => "Bahasa Indonesia",
            Language::English => "English",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A pluggable detector. `None` means undecided.
pub trait LanguageDetector: Send + Sync {
    fn detect(&self, text: &str) -> Option<Language>;
}

const INDONESIAN_SAMPLE: &str = "apa saja syarat pendaftaran mahasiswa baru di universitas padjadjaran \
    bagaimana cara mendaftar kuliah dan berapa biaya pendidikan setiap semester \
    informasi jadwal wisuda beasiswa dan kalender akademik dapat dilihat pada laman resmi \
    mahasiswa wajib mengisi formulir serta mengunggah berkas yang diperlukan \
    tidak ditemukan dalam dokumen silakan hubungi bagian akademik fakultas \
    kapan batas akhir pembayaran uang kuliah tunggal untuk program sarjana \
    dosen pembimbing memberikan persetujuan sebelum sidang skripsi dilaksanakan";

const ENGLISH_SAMPLE: &str = "what are the requirements for new student registration at the university \
    how do i apply for admission and how much are the tuition fees each semester \
    information about the graduation schedule scholarships and the academic calendar is available on the official website \
    students must fill in the form and upload the required documents \
    not found in the document please contact the faculty academic office \
    when is the deadline for paying the single tuition fee for the undergraduate program \
    the supervisor gives approval before the thesis defense takes place";

/// Minimum letters before the trigram detector will commit.
const MIN_LETTERS: usize = 8;

/// Minimum relative margin between the two profile scores.
const MIN_MARGIN: f32 = 0.2;

/// Character-trigram profile detector trained on small built-in samples.
pub struct TrigramProfileDetector {
    indonesian: HashMap<String, f32>,
    english: HashMap<String, f32>,
}

impl Default for TrigramProfileDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl TrigramProfileDetector {
    pub fn new() -> Self {
        Self {
            indonesian: Self::profile(INDONESIAN_SAMPLE),
            english: Self::profile(ENGLISH_SAMPLE),
        }
    }

    /// Space-padded word trigrams of the lowercased letters in `text`.
    fn trigrams(text: &str) -> Vec<String> {
        let lower = text.to_lowercase();
        let mut grams = Vec::new();

        for word in lower.split(|c: char| !c.is_alphabetic()).filter(|w| !w.is_empty()) {
            let padded: Vec<char> = format!(" {} ", word).chars().collect();
            for window in padded.windows(3) {
                grams.push(window.iter().collect());
            }
        }

        grams
    }

    /// Relative trigram frequencies.
    fn profile(sample: &str) -> HashMap<String, f32> {
        let grams = Self::trigrams(sample);
        let total = grams.len().max(1) as f32;

        let mut counts: HashMap<String, f32> = HashMap::new();
        for gram in grams {
            *counts.entry(gram).or_insert(0.0) += 1.0;
        }
        for value in counts.values_mut() {
            *value /= total;
        }
        counts
    }

    fn score(profile: &HashMap<String, f32>, grams: &[String]) -> f32 {
        grams.iter().filter_map(|g| profile.get(g)).sum()
    }
}

impl LanguageDetector for TrigramProfileDetector {
    fn detect(&self, text: &str) -> Option<Language> {
        let letters = text.chars().filter(|c| c.is_alphabetic()).count();
        if letters < MIN_LETTERS {
            return None;
        }

        let grams = Self::trigrams(text);
        let id = Self::score(&self.indonesian, &grams);
        let en = Self::score(&self.english, &grams);

        let best = id.max(en);
        if best <= 0.0 || (id - en).abs() / best < MIN_MARGIN {
            return None;
        }

        Some(if id > en {
            Language::Indonesian
        } else {
            Language::English
        })
    }
}

const INDONESIAN_SIGNALS: [&str; 24] = [
    "apa", "apakah", "bagaimana", "siapa", "kapan", "dimana", "mengapa", "kenapa", "berapa",
    "yang", "dan", "untuk", "dengan", "dari", "adalah", "saja", "tidak", "bisa", "syarat",
    "daftar", "kuliah", "mahasiswa", "jurusan", "biaya",
];

const ENGLISH_SIGNALS: [&str; 22] = [
    "what", "how", "who", "when", "where", "why", "which", "the", "and", "with", "for",
    "from", "this", "that", "are", "does", "can", "requirement", "student", "tuition",
    "please", "about",
];

fn count_signals(haystack: &str, signals: &[&str]) -> usize {
    signals.iter().map(|s| haystack.matches(s).count()).sum()
}

/// Signal-word vote; ties go to Indonesian.
pub fn detect_by_signal_words(text: &str) -> Language {
    let lower = text.to_lowercase();
    let id = count_signals(&lower, &INDONESIAN_SIGNALS);
    let en = count_signals(&lower, &ENGLISH_SIGNALS);

    if en > id {
        Language::English
    } else {
        Language::Indonesian
    }
}

/// Detect with an explicit detector. Blank input is English.
pub fn detect_language_with(detector: &dyn LanguageDetector, text: &str) -> Language {
    if text.trim().is_empty() {
        return Language::English;
    }

    detector
        .detect(text)
        .unwrap_or_else(|| detect_by_signal_words(text))
}

lazy_static! {
    static ref DEFAULT_DETECTOR: TrigramProfileDetector = TrigramProfileDetector::new();
}

/// Detect with the built-in trigram detector.
pub fn detect_language(text: &str) -> Language {
    detect_language_with(&*DEFAULT_DETECTOR, text)
}
