//! Fixed key-name table.
//!
//! Names follow terminfo (`key_up`, `key_dc`, `key_f1`, ...). Reverse lookup
//! walks the table in declaration order; that order is the documented
//! priority for ambiguous sequences and must not be re-sorted. Entries with
//! no sequence on a family exist so `all_names(false)` can enumerate the
//! complete vocabulary a binding may name.

use crate::caps::Family;

#[derive(Debug)]
struct Key {
    name: &'static str,
    xterm: &'static [u8],
    linux: &'static [u8],
}

macro_rules! key {
    ($name:literal) => {
        Key {
            name: $name,
            xterm: b"",
            linux: b"",
        }
    };
    ($name:literal, $both:literal) => {
        Key {
            name: $name,
            xterm: $both,
            linux: $both,
        }
    };
    ($name:literal, $xterm:literal, $linux:literal) => {
        Key {
            name: $name,
            xterm: $xterm,
            linux: $linux,
        }
    };
}

#[rustfmt::skip]
static KEY_TABLE: &[Key] = &[
    key!("key_a1"),
    key!("key_a3"),
    key!("key_b2", b"\x1bOE", b"\x1b[G"),
    key!("key_backspace", b"\x7f"),
    key!("key_beg"),
    key!("key_btab", b"\x1b[Z"),
    key!("key_c1"),
    key!("key_c3"),
    key!("key_cancel"),
    key!("key_catab"),
    key!("key_clear"),
    key!("key_close"),
    key!("key_command"),
    key!("key_copy"),
    key!("key_create"),
    key!("key_ctab"),
    key!("key_dc", b"\x1b[3~"),
    key!("key_dl"),
    key!("key_down", b"\x1bOB", b"\x1b[B"),
    key!("key_eic"),
    key!("key_end", b"\x1bOF", b"\x1b[4~"),
    key!("key_enter", b"\x1bOM", b""),
    key!("key_eol"),
    key!("key_eos"),
    key!("key_exit"),
    key!("key_f0"),
    key!("key_f1", b"\x1bOP", b"\x1b[[A"),
    key!("key_f2", b"\x1bOQ", b"\x1b[[B"),
    key!("key_f3", b"\x1bOR", b"\x1b[[C"),
    key!("key_f4", b"\x1bOS", b"\x1b[[D"),
    key!("key_f5", b"\x1b[15~", b"\x1b[[E"),
    key!("key_f6", b"\x1b[17~"),
    key!("key_f7", b"\x1b[18~"),
    key!("key_f8", b"\x1b[19~"),
    key!("key_f9", b"\x1b[20~"),
    key!("key_f10", b"\x1b[21~"),
    key!("key_f11", b"\x1b[23~"),
    key!("key_f12", b"\x1b[24~"),
    key!("key_f13", b"\x1b[1;2P", b"\x1b[25~"),
    key!("key_f14", b"\x1b[1;2Q", b"\x1b[26~"),
    key!("key_f15", b"\x1b[1;2R", b"\x1b[28~"),
    key!("key_f16", b"\x1b[1;2S", b"\x1b[29~"),
    key!("key_f17", b"\x1b[15;2~", b"\x1b[31~"),
    key!("key_f18", b"\x1b[17;2~", b"\x1b[32~"),
    key!("key_f19", b"\x1b[18;2~", b"\x1b[33~"),
    key!("key_f20", b"\x1b[19;2~", b"\x1b[34~"),
    key!("key_f21", b"\x1b[20;2~", b""),
    key!("key_f22", b"\x1b[21;2~", b""),
    key!("key_f23", b"\x1b[23;2~", b""),
    key!("key_f24", b"\x1b[24;2~", b""),
    key!("key_f25", b"\x1b[1;5P", b""),
    key!("key_f26", b"\x1b[1;5Q", b""),
    key!("key_f27", b"\x1b[1;5R", b""),
    key!("key_f28", b"\x1b[1;5S", b""),
    key!("key_f29", b"\x1b[15;5~", b""),
    key!("key_f30", b"\x1b[17;5~", b""),
    key!("key_f31", b"\x1b[18;5~", b""),
    key!("key_f32", b"\x1b[19;5~", b""),
    key!("key_f33", b"\x1b[20;5~", b""),
    key!("key_f34", b"\x1b[21;5~", b""),
    key!("key_f35", b"\x1b[23;5~", b""),
    key!("key_f36", b"\x1b[24;5~", b""),
    key!("key_f37", b"\x1b[1;6P", b""),
    key!("key_f38", b"\x1b[1;6Q", b""),
    key!("key_f39", b"\x1b[1;6R", b""),
    key!("key_f40", b"\x1b[1;6S", b""),
    key!("key_f41", b"\x1b[15;6~", b""),
    key!("key_f42", b"\x1b[17;6~", b""),
    key!("key_f43", b"\x1b[18;6~", b""),
    key!("key_f44", b"\x1b[19;6~", b""),
    key!("key_f45", b"\x1b[20;6~", b""),
    key!("key_f46", b"\x1b[21;6~", b""),
    key!("key_f47", b"\x1b[23;6~", b""),
    key!("key_f48", b"\x1b[24;6~", b""),
    key!("key_f49"),
    key!("key_f50"),
    key!("key_f51"),
    key!("key_f52"),
    key!("key_f53"),
    key!("key_f54"),
    key!("key_f55"),
    key!("key_f56"),
    key!("key_f57"),
    key!("key_f58"),
    key!("key_f59"),
    key!("key_f60"),
    key!("key_f61"),
    key!("key_f62"),
    key!("key_f63"),
    key!("key_find"),
    key!("key_help"),
    key!("key_home", b"\x1bOH", b"\x1b[1~"),
    key!("key_ic", b"\x1b[2~"),
    key!("key_il"),
    key!("key_left", b"\x1bOD", b"\x1b[D"),
    key!("key_ll"),
    key!("key_mark"),
    key!("key_message"),
    key!("key_move"),
    key!("key_next"),
    key!("key_npage", b"\x1b[6~"),
    key!("key_open"),
    key!("key_options"),
    key!("key_ppage", b"\x1b[5~"),
    key!("key_previous"),
    key!("key_print"),
    key!("key_redo"),
    key!("key_reference"),
    key!("key_refresh"),
    key!("key_replace"),
    key!("key_restart"),
    key!("key_resume"),
    key!("key_right", b"\x1bOC", b"\x1b[C"),
    key!("key_save"),
    key!("key_sbeg"),
    key!("key_scancel"),
    key!("key_scommand"),
    key!("key_scopy"),
    key!("key_screate"),
    key!("key_sdc", b"\x1b[3;2~", b""),
    key!("key_sdl"),
    key!("key_select"),
    key!("key_send", b"\x1b[1;2F", b""),
    key!("key_seol"),
    key!("key_sexit"),
    key!("key_sf", b"\x1b[1;2B", b""),
    key!("key_sfind"),
    key!("key_shelp"),
    key!("key_shome", b"\x1b[1;2H", b""),
    key!("key_sic", b"\x1b[2;2~", b""),
    key!("key_sleft", b"\x1b[1;2D", b""),
    key!("key_smessage"),
    key!("key_smove"),
    key!("key_snext", b"\x1b[6;2~", b""),
    key!("key_soptions"),
    key!("key_sprevious", b"\x1b[5;2~", b""),
    key!("key_sprint"),
    key!("key_sr", b"\x1b[1;2A", b""),
    key!("key_sredo"),
    key!("key_sreplace"),
    key!("key_sright", b"\x1b[1;2C", b""),
    key!("key_srsume"),
    key!("key_ssave"),
    key!("key_ssuspend"),
    key!("key_stab"),
    key!("key_sundo"),
    key!("key_suspend"),
    key!("key_undo"),
    key!("key_up", b"\x1bOA", b"\x1b[A"),
];

fn seq_for(key: &'static Key, family: Family) -> &'static [u8] {
    match family {
        Family::Linux => key.linux,
        Family::Xterm => key.xterm,
        Family::Dumb => b"",
    }
}

pub(crate) fn sequence_for_key(family: Family, name: &str) -> Option<&'static [u8]> {
    KEY_TABLE
        .iter()
        .find(|k| k.name == name)
        .map(|k| seq_for(k, family))
}

pub(crate) fn name_for_sequence(family: Family, seq: &[u8]) -> Option<&'static str> {
    if seq.is_empty() {
        return None;
    }
    KEY_TABLE
        .iter()
        .find(|k| seq_for(k, family) == seq)
        .map(|k| k.name)
}

pub(crate) fn all_names(family: Family, skip_empty: bool) -> Vec<&'static str> {
    KEY_TABLE
        .iter()
        .filter(|k| !skip_empty || !seq_for(k, family).is_empty())
        .map(|k| k.name)
        .collect()
}
