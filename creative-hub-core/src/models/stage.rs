//! Stage identifiers and the fixed stage registry

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One stage of the six-stage creative pipeline, in pipeline order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    /// One-sentence idea expanded into a three-act outline
    Story,
    /// Outline broken down into scenes
    Script,
    /// Aspect ratio, style, frame rate and model choice
    Config,
    /// Character reference sheets
    Character,
    /// Per-scene image/video generation
    #[serde(alias = "shots")]
    Storyboard,
    /// Sequence, transitions and music suggestions
    #[serde(alias = "postproduction")]
    Edit,
}

impl StageId {
    /// All stages in pipeline order
    pub const ALL: [StageId; 6] = [
        StageId::Story,
        StageId::Script,
        StageId::Config,
        StageId::Character,
        StageId::Storyboard,
        StageId::Edit,
    ];

    /// Number of stages in the pipeline
    pub const COUNT: usize = Self::ALL.len();

    /// Position of this stage in the pipeline (0-based)
    pub fn index(self) -> usize {
        self as usize
    }

    /// Stage at the given position
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn first() -> Self {
        Self::ALL[0]
    }

    pub fn last() -> Self {
        Self::ALL[Self::COUNT - 1]
    }

    /// Following stage, `None` at the last stage
    pub fn next(self) -> Option<Self> {
        Self::from_index(self.index() + 1)
    }

    /// Preceding stage, `None` at the first stage
    pub fn prev(self) -> Option<Self> {
        self.index().checked_sub(1).and_then(Self::from_index)
    }

    pub fn is_last(self) -> bool {
        self == Self::last()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Story => "story",
            Self::Script => "script",
            Self::Config => "config",
            Self::Character => "character",
            Self::Storyboard => "storyboard",
            Self::Edit => "edit",
        }
    }

    /// Static metadata for this stage
    pub fn descriptor(self) -> &'static StageDescriptor {
        &REGISTRY[self.index()]
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "story" => Ok(Self::Story),
            "script" => Ok(Self::Script),
            "config" => Ok(Self::Config),
            "character" => Ok(Self::Character),
            "storyboard" | "shots" => Ok(Self::Storyboard),
            "edit" | "postproduction" => Ok(Self::Edit),
            other => Err(format!("Unknown stage '{}'", other)),
        }
    }
}

/// Display metadata for a stage
#[derive(Debug, Clone, Serialize)]
pub struct StageDescriptor {
    pub id: StageId,
    pub title: &'static str,
    pub description: &'static str,
}

static REGISTRY: [StageDescriptor; StageId::COUNT] = [
    StageDescriptor {
        id: StageId::Story,
        title: "故事起稿",
        description: "一句话转三幕剧大纲",
    },
    StageDescriptor {
        id: StageId::Script,
        title: "分段脚本",
        description: "拆解分镜、旁白、画面描述",
    },
    StageDescriptor {
        id: StageId::Config,
        title: "创作配置",
        description: "推荐尺寸/画风/帧率",
    },
    StageDescriptor {
        id: StageId::Character,
        title: "角色设定",
        description: "生成参考图与三视图",
    },
    StageDescriptor {
        id: StageId::Storyboard,
        title: "分镜生成",
        description: "批量图转视频",
    },
    StageDescriptor {
        id: StageId::Edit,
        title: "剪辑建议",
        description: "拼接顺序、转场、配乐",
    },
];

/// The stage registry, in pipeline order
pub fn stages() -> &'static [StageDescriptor] {
    &REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_order_matches_ids() {
        let registry = stages();
        assert_eq!(registry.len(), 6);
        for (index, descriptor) in registry.iter().enumerate() {
            assert_eq!(descriptor.id.index(), index);
            assert_eq!(StageId::from_index(index), Some(descriptor.id));
        }
    }

    #[test]
    fn test_neighbours() {
        assert_eq!(StageId::Story.prev(), None);
        assert_eq!(StageId::Story.next(), Some(StageId::Script));
        assert_eq!(StageId::Edit.next(), None);
        assert_eq!(StageId::Edit.prev(), Some(StageId::Storyboard));
        assert!(StageId::Edit.is_last());
        assert_eq!(StageId::first(), StageId::Story);
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!("shots".parse::<StageId>(), Ok(StageId::Storyboard));
        assert_eq!("postproduction".parse::<StageId>(), Ok(StageId::Edit));
        assert_eq!(" Config ".parse::<StageId>(), Ok(StageId::Config));
        assert!("music".parse::<StageId>().is_err());

        let parsed: StageId = serde_json::from_str(r#""shots""#).unwrap();
        assert_eq!(parsed, StageId::Storyboard);
        assert_eq!(serde_json::to_string(&parsed).unwrap(), r#""storyboard""#);
    }
}
