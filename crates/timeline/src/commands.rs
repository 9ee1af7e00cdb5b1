use serde::{Deserialize, Serialize};

use crate::{Frame, Scene, SceneId, SceneList, TimelineError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum TimelineCommand {
    SetTiming {
        scene_id: SceneId,
        duration: Frame,
        trim_in: Frame,
    },
    InsertScene {
        index: usize,
        scene: Scene,
    },
    RemoveScene {
        scene_id: SceneId,
    },
    MoveScene {
        scene_id: SceneId,
        index: usize,
    },
    Batch {
        commands: Vec<TimelineCommand>,
    },
}

/// Applies a command and returns its inverse.
pub fn apply_command(
    scenes: &mut SceneList,
    command: TimelineCommand,
) -> Result<TimelineCommand, TimelineError> {
    match command {
        TimelineCommand::SetTiming {
            scene_id,
            duration,
            trim_in,
        } => set_timing(scenes, scene_id, duration, trim_in),
        TimelineCommand::InsertScene { index, scene } => insert_scene(scenes, index, scene),
        TimelineCommand::RemoveScene { scene_id } => remove_scene(scenes, scene_id),
        TimelineCommand::MoveScene { scene_id, index } => move_scene(scenes, scene_id, index),
        TimelineCommand::Batch { commands } => apply_batch(scenes, commands),
    }
}

fn set_timing(
    scenes: &mut SceneList,
    scene_id: SceneId,
    duration: Frame,
    trim_in: Frame,
) -> Result<TimelineCommand, TimelineError> {
    if duration < 1 {
        return Err(TimelineError::InvalidOp(format!(
            "duration {duration} for scene {scene_id}"
        )));
    }
    let previous_duration = scenes
        .set_duration(scene_id, duration)
        .ok_or(TimelineError::SceneNotFound(scene_id))?;
    let previous_trim = scenes.set_trim_in(scene_id, trim_in).unwrap_or_default();
    Ok(TimelineCommand::SetTiming {
        scene_id,
        duration: previous_duration,
        trim_in: previous_trim,
    })
}

fn insert_scene(
    scenes: &mut SceneList,
    index: usize,
    scene: Scene,
) -> Result<TimelineCommand, TimelineError> {
    if scenes.get(scene.id).is_some() {
        return Err(TimelineError::SceneExists(scene.id));
    }
    let scene_id = scene.id;
    scenes.insert(index, scene);
    Ok(TimelineCommand::RemoveScene { scene_id })
}

fn remove_scene(
    scenes: &mut SceneList,
    scene_id: SceneId,
) -> Result<TimelineCommand, TimelineError> {
    let (index, scene) = scenes
        .remove(scene_id)
        .ok_or(TimelineError::SceneNotFound(scene_id))?;
    Ok(TimelineCommand::InsertScene { index, scene })
}

fn move_scene(
    scenes: &mut SceneList,
    scene_id: SceneId,
    index: usize,
) -> Result<TimelineCommand, TimelineError> {
    let from = scenes
        .move_to(scene_id, index)
        .ok_or(TimelineError::SceneNotFound(scene_id))?;
    Ok(TimelineCommand::MoveScene {
        scene_id,
        index: from,
    })
}

fn apply_batch(
    scenes: &mut SceneList,
    commands: Vec<TimelineCommand>,
) -> Result<TimelineCommand, TimelineError> {
    let mut inverses = Vec::with_capacity(commands.len());
    for command in commands {
        match apply_command(scenes, command) {
            Ok(inverse) => inverses.push(inverse),
            Err(err) => {
                // Leave the list as it was before the batch.
                while let Some(inverse) = inverses.pop() {
                    let _ = apply_command(scenes, inverse);
                }
                return Err(err);
            }
        }
    }
    inverses.reverse();
    Ok(TimelineCommand::Batch { commands: inverses })
}

#[derive(Debug, Default, Clone)]
pub struct CommandHistory {
    undo_stack: Vec<TimelineCommand>,
    redo_stack: Vec<TimelineCommand>,
}

impl CommandHistory {
    pub fn apply(
        &mut self,
        scenes: &mut SceneList,
        command: TimelineCommand,
    ) -> Result<(), TimelineError> {
        let inverse = apply_command(scenes, command)?;
        self.record(inverse);
        Ok(())
    }

    /// Records the inverse of a change that was already applied elsewhere.
    pub fn record(&mut self, inverse: TimelineCommand) {
        self.undo_stack.push(inverse);
        self.redo_stack.clear();
    }

    pub fn undo(&mut self, scenes: &mut SceneList) -> Result<(), TimelineError> {
        let command = self
            .undo_stack
            .pop()
            .ok_or(TimelineError::HistoryEmpty("undo stack"))?;
        let inverse = apply_command(scenes, command)?;
        self.redo_stack.push(inverse);
        Ok(())
    }

    pub fn redo(&mut self, scenes: &mut SceneList) -> Result<(), TimelineError> {
        let command = self
            .redo_stack
            .pop()
            .ok_or(TimelineError::HistoryEmpty("redo stack"))?;
        let inverse = apply_command(scenes, command)?;
        self.undo_stack.push(inverse);
        Ok(())
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

/// Command that replaces a scene by its two halves.
pub fn cut_command(scenes: &SceneList, scene_id: SceneId) -> Option<TimelineCommand> {
    let index = scenes.index_of(scene_id)?;
    let (first, second) = scenes.get(scene_id)?.split()?;
    Some(TimelineCommand::Batch {
        commands: vec![
            TimelineCommand::RemoveScene { scene_id },
            TimelineCommand::InsertScene {
                index,
                scene: first,
            },
            TimelineCommand::InsertScene {
                index: index + 1,
                scene: second,
            },
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ScenePayload;

    fn list(durations: &[Frame]) -> SceneList {
        durations
            .iter()
            .map(|d| Scene::new("s", *d, ScenePayload::new("code")))
            .collect()
    }

    #[test]
    fn undo_redo_cut() {
        let mut scenes = list(&[150, 90, 120]);
        let before = scenes.clone();
        let target = scenes.ids()[1];
        let mut history = CommandHistory::default();

        let cut = cut_command(&scenes, target).unwrap();
        history.apply(&mut scenes, cut).unwrap();
        assert_eq!(scenes.len(), 4);
        assert_eq!(scenes.total_duration(), 360);

        history.undo(&mut scenes).unwrap();
        assert_eq!(scenes, before);

        history.redo(&mut scenes).unwrap();
        assert_eq!(scenes.len(), 4);
        assert!(scenes.get(target).is_none());
    }

    #[test]
    fn failed_batch_rolls_back() {
        let mut scenes = list(&[30, 40]);
        let before = scenes.clone();
        let first = scenes.ids()[0];
        let batch = TimelineCommand::Batch {
            commands: vec![
                TimelineCommand::RemoveScene { scene_id: first },
                TimelineCommand::RemoveScene {
                    scene_id: SceneId::new(),
                },
            ],
        };
        assert!(matches!(
            apply_command(&mut scenes, batch),
            Err(TimelineError::SceneNotFound(_))
        ));
        assert_eq!(scenes, before);
    }

    #[test]
    fn set_timing_inverse_restores_previous() {
        let mut scenes = list(&[120]);
        let id = scenes.ids()[0];
        let inverse = apply_command(
            &mut scenes,
            TimelineCommand::SetTiming {
                scene_id: id,
                duration: 60,
                trim_in: 60,
            },
        )
        .unwrap();
        assert_eq!(scenes.get(id).map(|s| (s.duration, s.trim_in)), Some((60, 60)));
        apply_command(&mut scenes, inverse).unwrap();
        assert_eq!(scenes.get(id).map(|s| (s.duration, s.trim_in)), Some((120, 0)));
    }

    #[test]
    fn new_command_clears_redo() {
        let mut scenes = list(&[30, 40, 50]);
        let ids = scenes.ids();
        let mut history = CommandHistory::default();
        history
            .apply(&mut scenes, TimelineCommand::RemoveScene { scene_id: ids[0] })
            .unwrap();
        history.undo(&mut scenes).unwrap();
        assert!(history.can_redo());
        history
            .apply(
                &mut scenes,
                TimelineCommand::MoveScene {
                    scene_id: ids[2],
                    index: 0,
                },
            )
            .unwrap();
        assert!(!history.can_redo());
        assert!(matches!(
            history.redo(&mut scenes),
            Err(TimelineError::HistoryEmpty(_))
        ));
    }
}
