// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Command codes and lock-state enumerations.

use std::fmt;

/// Command code carried in the second header word of every frame.
///
/// Codes are shared by both directions. Some are client requests, some
/// are server notifications, and some are echoed both ways.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Command {
    Login = 1,
    GetMapList = 2,
    OpenMap = 3,
    CloseMap = 4,
    AddMap = 5,
    RenameMap = 6,
    DeleteMap = 7,
    AddSymbol = 8,
    RenameSymbol = 9,
    DeleteSymbol = 10,
    TranslateSymbol = 11,
    AddConnection = 12,
    RenameConnection = 13,
    DeleteConnection = 14,
    EditConnection = 15,
    AddNode = 16,
    DeleteNode = 17,
    OpenNode = 18,
    CloseNode = 19,
    SetNode = 20,
    UpdateNode = 21,
    LockNode = 22,
    UnlockNode = 23,
}

impl Command {
    const ALL: [Command; 23] = [
        Self::Login,
        Self::GetMapList,
        Self::OpenMap,
        Self::CloseMap,
        Self::AddMap,
        Self::RenameMap,
        Self::DeleteMap,
        Self::AddSymbol,
        Self::RenameSymbol,
        Self::DeleteSymbol,
        Self::TranslateSymbol,
        Self::AddConnection,
        Self::RenameConnection,
        Self::DeleteConnection,
        Self::EditConnection,
        Self::AddNode,
        Self::DeleteNode,
        Self::OpenNode,
        Self::CloseNode,
        Self::SetNode,
        Self::UpdateNode,
        Self::LockNode,
        Self::UnlockNode,
    ];

    pub const fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.code() == code)
    }

    /// Smallest total frame length (header included) a request with this
    /// code can have. Shorter frames are dropped as size errors.
    pub const fn min_frame_size(self) -> usize {
        match self {
            Self::OpenMap
            | Self::CloseMap
            | Self::OpenNode
            | Self::CloseNode
            | Self::SetNode
            | Self::LockNode
            | Self::UnlockNode => 12,
            Self::DeleteSymbol | Self::DeleteConnection => 16,
            Self::RenameSymbol | Self::RenameConnection => 20,
            Self::AddSymbol | Self::TranslateSymbol | Self::AddConnection => 24,
            _ => 8,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Login => "LOGIN",
            Self::GetMapList => "GET_MAPLIST",
            Self::OpenMap => "OPEN_MAP",
            Self::CloseMap => "CLOSE_MAP",
            Self::AddMap => "ADD_MAP",
            Self::RenameMap => "RENAME_MAP",
            Self::DeleteMap => "DELETE_MAP",
            Self::AddSymbol => "ADD_SYMBOL",
            Self::RenameSymbol => "RENAME_SYMBOL",
            Self::DeleteSymbol => "DELETE_SYMBOL",
            Self::TranslateSymbol => "TRANSLATE_SYMBOL",
            Self::AddConnection => "ADD_CONNECTION",
            Self::RenameConnection => "RENAME_CONNECTION",
            Self::DeleteConnection => "DELETE_CONNECTION",
            Self::EditConnection => "EDIT_CONNECTION",
            Self::AddNode => "ADD_NODE",
            Self::DeleteNode => "DELETE_NODE",
            Self::OpenNode => "OPEN_NODE",
            Self::CloseNode => "CLOSE_NODE",
            Self::SetNode => "SET_NODE",
            Self::UpdateNode => "UPDATE_NODE",
            Self::LockNode => "LOCK_NODE",
            Self::UnlockNode => "UNLOCK_NODE",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lock state as seen by one particular session.
///
/// The same lock event is rendered once per recipient: the holder sees
/// `LockedLocal`, everyone else `LockedRemote`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LockKind {
    Unlocked = 0,
    LockedLocal = 1,
    LockedRemote = 2,
    NotFound = 3,
}

impl LockKind {
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Unlocked),
            1 => Some(Self::LockedLocal),
            2 => Some(Self::LockedRemote),
            3 => Some(Self::NotFound),
            _ => None,
        }
    }
}
