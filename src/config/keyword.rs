//! Классический формат опций: слова через пробел между `BEGIN` и `END`.
//!
//! ```text
//! BEGIN
//!   STEPS 50
//!   LATTYPE DIAGONAL
//!   COIN CUSTOM
//!   BLPERMANENT
//! END
//!
//! BEGINCOIN
//!   0.5 0  0.5 0  0.5 0  0.5 0 ...
//!
//! BEGINBL
//!   POINT 3 3
//!   LINE -5 0 5 0
//! ENDBL
//! ```

use std::fs;
use std::path::Path;
use std::str::FromStr;

use log::{debug, warn};
use num_complex::Complex64;

use super::WalkOptions;
use crate::coin::CoinKind;
use crate::error::{Result, WalkError};
use crate::lattice::Topology;
use crate::links::LinkDefect;
use crate::measure::Detector;
use crate::screen::ScreenSpec;
use crate::state::StateKind;

struct Tokens<'a> {
    items: Vec<(usize, &'a str)>,
    pos: usize,
}

impl<'a> Tokens<'a> {
    fn new(text: &'a str) -> Self {
        let items = text
            .lines()
            .enumerate()
            .flat_map(|(i, line)| line.split_whitespace().map(move |word| (i + 1, word)))
            .collect();
        Self { items, pos: 0 }
    }

    fn line(&self) -> usize {
        self.items
            .get(self.pos.saturating_sub(1))
            .map(|&(line, _)| line)
            .unwrap_or(0)
    }

    fn error(&self, message: impl Into<String>) -> WalkError {
        WalkError::Parse {
            line: self.line(),
            message: message.into(),
        }
    }

    /// Переходит к слову сразу после `marker`, начиная с начала текста
    fn seek(&mut self, marker: &str) -> bool {
        match self.items.iter().position(|&(_, word)| word == marker) {
            Some(index) => {
                self.pos = index + 1;
                true
            }
            None => false,
        }
    }

    fn word(&mut self, what: &str) -> Result<&'a str> {
        let item = self.items.get(self.pos).map(|&(_, word)| word);
        self.pos += 1;
        item.ok_or_else(|| self.error(format!("текст закончился, ожидалось {}", what)))
    }

    fn value<T: FromStr>(&mut self, what: &str) -> Result<T> {
        let word = self.word(what)?;
        word.parse()
            .map_err(|_| self.error(format!("{}: некорректное значение '{}'", what, word)))
    }

    fn count(&mut self, what: &str, min: i64) -> Result<usize> {
        let value: i64 = self.value(what)?;
        if value < min {
            return Err(self.error(format!("{} должно быть не меньше {}, получено {}", what, min, value)));
        }
        Ok(value as usize)
    }

    fn probability(&mut self, what: &str) -> Result<f64> {
        let value: f64 = self.value(what)?;
        if !(0.0..=1.0).contains(&value) {
            return Err(self.error(format!("{} вне отрезка [0, 1]: {}", what, value)));
        }
        Ok(value)
    }

    fn complex(&mut self, what: &str) -> Result<Complex64> {
        let re = self.value(what)?;
        let im = self.value(what)?;
        Ok(Complex64::new(re, im))
    }
}

/// Разбирает файл опций для блуждания размерности `dims`
pub fn parse_keyword_options(text: &str, dims: usize) -> Result<WalkOptions> {
    if dims != 1 && dims != 2 {
        return Err(WalkError::DimensionMismatch { expected: 2, found: dims });
    }
    let mut tokens = Tokens::new(text);
    if !tokens.seek("BEGIN") {
        return Err(tokens.error("не найдено ключевое слово BEGIN"));
    }

    let mut options = WalkOptions::defaults(dims);
    let mut permanent_links = false;
    loop {
        let keyword = tokens.word("END")?;
        match keyword {
            "END" => break,
            "COIN" => {
                let word = tokens.word("тип монеты")?;
                options.coin = CoinKind::from_keyword(word)
                    .ok_or_else(|| tokens.error(format!("неизвестная монета {}", word)))?;
            }
            "STATE" => {
                let word = tokens.word("тип состояния")?;
                options.state = StateKind::from_keyword(word)
                    .ok_or_else(|| tokens.error(format!("неизвестное состояние {}", word)))?;
            }
            "STEPS" => {
                options.steps = tokens.count("STEPS", 1)?;
                options.max = options.steps + options.extra;
            }
            "AFTERMEASURE" => options.steps_after_measure = tokens.count("AFTERMEASURE", 0)?,
            "CHECK" => match tokens.word("вид проверки")? {
                "STATEPROB" => options.checks.norm = true,
                "SYMMETRY" | "XSYMMETRY" => options.checks.symmetry_x = true,
                "YSYMMETRY" if dims == 2 => options.checks.symmetry_y = true,
                other => return Err(tokens.error(format!("неизвестная проверка {}", other))),
            },
            "CALCMIX" | "MIXTIME" => {
                if keyword == "CALCMIX" {
                    warn!("Ключевое слово CALCMIX устарело, используйте MIXTIME");
                }
                options.mixing_steps = tokens.count(keyword, 0)?;
            }
            "BLPROB" => {
                options.break_probabilities.a = tokens.probability("BLPROB")?;
                if dims == 2 {
                    options.break_probabilities.b = tokens.probability("BLPROB")?;
                }
            }
            "DTPROB" => options.decoherence = tokens.probability("DTPROB")?,
            "EXPERIMENTS" => options.experiments = tokens.count("EXPERIMENTS", 1)?,
            "LATTSIZE" => {
                options.max = tokens.count("LATTSIZE", 1)?;
                if options.topology.is_open() {
                    options.max += options.extra;
                }
            }
            "LATTEXTRA" => options.extra = tokens.count("LATTEXTRA", 0)?,
            "LATTTYPE" | "LATTYPE" => {
                if keyword == "LATTTYPE" {
                    warn!("Ключевое слово LATTTYPE устарело, используйте LATTYPE");
                }
                let word = tokens.word("тип решётки")?;
                options.topology = Topology::from_keyword(word, dims)
                    .ok_or_else(|| tokens.error(format!("неизвестная решётка {} для {}D", word, dims)))?;
                if !options.topology.is_open() {
                    // LATTSIZE мог уже добавить запас
                    options.max = options.max.saturating_sub(options.extra).max(1);
                    options.extra = 0;
                    options.checks.symmetry_x = false;
                    options.checks.symmetry_y = false;
                }
            }
            "DETECTORS" => {
                let count = tokens.count("DETECTORS", 1)?;
                options.detectors = (0..count)
                    .map(|_| -> Result<Detector> {
                        let x = tokens.value("координата детектора")?;
                        let y = if dims == 2 { tokens.value("координата детектора")? } else { 0 };
                        Ok(Detector::new(x, y))
                    })
                    .collect::<Result<Vec<_>>>()?;
            }
            "SEED" => {
                let seed: i64 = tokens.value("SEED")?;
                options.seed = Some(seed.unsigned_abs());
            }
            "SCREEN" if dims == 2 => {
                let mut next = || tokens.value::<i64>("координата экрана");
                let from = (next()?, next()?);
                let to = (next()?, next()?);
                options.screen = Some(ScreenSpec { from, to });
            }
            "BLPERMANENT" if dims == 2 => permanent_links = true,
            other => return Err(tokens.error(format!("неизвестное ключевое слово {}", other))),
        }
    }

    let lattice = options.lattice()?;
    if options.coin == CoinKind::Custom {
        if !tokens.seek("BEGINCOIN") {
            return Err(tokens.error("монета CUSTOM требует раздела BEGINCOIN"));
        }
        let entries = if dims == 1 { 4 } else { 16 };
        options.custom_coin = Some(
            (0..entries)
                .map(|_| tokens.complex("элемент монеты"))
                .collect::<Result<Vec<_>>>()?,
        );
    }
    if options.state == StateKind::Custom {
        if !tokens.seek("BEGINSTATE") {
            return Err(tokens.error("состояние CUSTOM требует раздела BEGINSTATE"));
        }
        let amplitudes = lattice.site_count() * lattice.coins();
        options.custom_state = Some(
            (0..amplitudes)
                .map(|_| tokens.complex("амплитуда состояния"))
                .collect::<Result<Vec<_>>>()?,
        );
    }
    if permanent_links {
        options.defects = read_defects(&mut tokens, |x| lattice.index_of(x).is_some())?;
    }

    debug!(
        "Опции: {} max={} extra={} шагов={} испытаний={}",
        options.topology, options.max, options.extra, options.steps, options.experiments
    );
    options.validate()?;
    Ok(options)
}

fn read_defects(tokens: &mut Tokens<'_>, inside: impl Fn(i64) -> bool) -> Result<Vec<LinkDefect>> {
    if !tokens.seek("BEGINBL") {
        return Err(tokens.error("BLPERMANENT требует раздела BEGINBL"));
    }
    let mut defects = Vec::new();
    loop {
        let defect = match tokens.word("ENDBL")? {
            "ENDBL" => break,
            "POINT" => LinkDefect::Point {
                x: tokens.value("x")?,
                y: tokens.value("y")?,
            },
            "LINE" => LinkDefect::Line {
                x0: tokens.value("x0")?,
                y0: tokens.value("y0")?,
                x1: tokens.value("x1")?,
                y1: tokens.value("y1")?,
            },
            other => return Err(tokens.error(format!("неизвестный дефект {}", other))),
        };
        let ends = match defect {
            LinkDefect::Point { x, y } => [x, y, x, y],
            LinkDefect::Line { x0, y0, x1, y1 } => [x0, y0, x1, y1],
        };
        if !ends.iter().all(|&c| inside(c)) {
            return Err(tokens.error(format!("дефект {:?} выходит за решётку", defect)));
        }
        // наклон проверяется сразу, чтобы ошибка указывала на строку
        defect.sites().map_err(|e| tokens.error(e.to_string()))?;
        defects.push(defect);
    }
    Ok(defects)
}

pub fn read_keyword_file(path: &Path, dims: usize) -> Result<WalkOptions> {
    let text = fs::read_to_string(path)?;
    parse_keyword_options(&text, dims)
}
