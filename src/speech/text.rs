//! Text helpers for spoken output
//!
//! Formatting of counts and durations shared by response templates and
//! progress announcements, plus the cleanup applied to text before it is
//! handed to a speech provider.

/// "1 assertion", "6 assertions"
pub fn count_phrase(count: u64, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("1 {}", singular)
    } else {
        format!("{} {}", count, plural)
    }
}

/// Human duration: "under a second", "3.5 seconds", "2 minutes and 5 seconds"
pub fn format_duration_ms(ms: u64) -> String {
    if ms < 1000 {
        return "under a second".to_string();
    }

    if ms < 10_000 {
        let tenths = (ms + 50) / 100;
        let (whole, frac) = (tenths / 10, tenths % 10);
        return if frac == 0 {
            count_phrase(whole, "second", "seconds")
        } else {
            format!("{}.{} seconds", whole, frac)
        };
    }

    let secs = (ms + 500) / 1000;
    if secs < 60 {
        return count_phrase(secs, "second", "seconds");
    }

    if secs < 3600 {
        let (minutes, rest) = (secs / 60, secs % 60);
        let head = count_phrase(minutes, "minute", "minutes");
        return if rest == 0 {
            head
        } else {
            format!("{} and {}", head, count_phrase(rest, "second", "seconds"))
        };
    }

    let (hours, minutes) = (secs / 3600, (secs % 3600) / 60);
    let head = count_phrase(hours, "hour", "hours");
    if minutes == 0 {
        head
    } else {
        format!("{} and {}", head, count_phrase(minutes, "minute", "minutes"))
    }
}

/// Coarse remaining-time phrase: seconds rounded up to a multiple of five,
/// whole minutes past the first minute
pub fn describe_remaining(ms: u64) -> String {
    let secs = ms.div_ceil(1000);
    if secs < 60 {
        let rounded = (secs.div_ceil(5) * 5).max(5);
        if rounded < 60 {
            return format!("roughly {} seconds", rounded);
        }
    }
    let minutes = ((secs + 30) / 60).max(1);
    format!("roughly {}", count_phrase(minutes, "minute", "minutes"))
}

/// Prepare text for a speech provider
///
/// Expands symbols and abbreviations that providers read badly and drops
/// characters that carry no speech.
pub fn normalize_text_for_speech(text: &str) -> String {
    let mut result = text.to_string();

    let abbreviations = [
        ("e.g.", "for example"),
        ("i.e.", "that is"),
        ("etc.", "etcetera"),
        ("vs.", "versus"),
        ("approx.", "approximately"),
        ("mins.", "minutes"),
        ("secs.", "seconds"),
    ];

    for (abbrev, expansion) in abbreviations {
        result = result.replace(abbrev, expansion);
    }

    result = result.replace('&', " and ");
    result = result.replace('%', " percent");
    result = result.replace('$', " dollars ");
    result = result.replace('+', " plus ");
    result = result.replace('=', " equals ");
    // Paths and identifiers
    result = result.replace(&['/', '\\', '_'][..], " ");

    result = expand_ordinals(&result);
    result = expand_time_format(&result);

    result = result.split_whitespace().collect::<Vec<_>>().join(" ");

    result = result
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || ".,!?;:'-\"".contains(*c))
        .collect();

    result.trim().to_string()
}

const ORDINALS: &[(&str, &str)] = &[
    ("1st", "first"),
    ("2nd", "second"),
    ("3rd", "third"),
    ("4th", "fourth"),
    ("5th", "fifth"),
    ("10th", "tenth"),
];

/// Expand whole-word ordinals only; "21st" stays as written
fn expand_ordinals(text: &str) -> String {
    text.split_inclusive(char::is_whitespace)
        .map(|token| {
            let core = token
                .trim_end()
                .trim_end_matches(|c: char| c.is_ascii_punctuation());
            match ORDINALS.iter().find(|(ordinal, _)| ordinal.eq_ignore_ascii_case(core)) {
                Some((_, word)) => format!("{}{}", word, &token[core.len()..]),
                None => token.to_string(),
            }
        })
        .collect()
}

/// "3:30" -> "three thirty"
fn expand_time_format(text: &str) -> String {
    let mut result = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if !c.is_ascii_digit() {
            result.push(c);
            continue;
        }

        let mut num = String::from(c);
        while let Some(next) = chars.next_if(|n| n.is_ascii_digit()) {
            num.push(next);
        }

        if chars.next_if_eq(&':').is_none() {
            result.push_str(&num);
            continue;
        }

        let mut minutes = String::new();
        while minutes.len() < 2 {
            match chars.next_if(|n| n.is_ascii_digit()) {
                Some(d) => minutes.push(d),
                None => break,
            }
        }

        if minutes.is_empty() {
            result.push_str(&num);
            result.push(':');
        } else if minutes == "00" {
            result.push_str(&format!("{} o'clock", number_to_words(&num)));
        } else {
            result.push_str(&format!(
                "{} {}",
                number_to_words(&num),
                number_to_words(&minutes)
            ));
        }
    }

    result
}

fn number_to_words(num_str: &str) -> String {
    let num: u32 = match num_str.parse() {
        Ok(n) => n,
        Err(_) => return num_str.to_string(),
    };

    let ones = [
        "", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
        "eleven", "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen",
        "eighteen", "nineteen",
    ];

    let tens = [
        "", "", "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety",
    ];

    match num {
        0 => "zero".to_string(),
        1..=19 => ones[num as usize].to_string(),
        20..=99 => {
            let (t, o) = ((num / 10) as usize, (num % 10) as usize);
            if o == 0 {
                tens[t].to_string()
            } else {
                format!("{}-{}", tens[t], ones[o])
            }
        }
        _ => num_str.to_string(),
    }
}
